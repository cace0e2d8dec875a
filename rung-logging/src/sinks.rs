//! Migrator log sinks backed by tracing

use rung_core::LogSink;
use std::sync::Arc;

/// Target of events emitted through the migrator sinks
pub const SINK_TARGET: &str = "rung";

/// Progress and debug sinks for a [`Migrator`](rung_core::Migrator).
///
/// Progress text becomes `info` events and debug text `debug` events, both
/// under the [`SINK_TARGET`] target.
pub fn tracing_sinks() -> (LogSink, LogSink) {
    let log: LogSink = Arc::new(|line: &str| tracing::info!(target: SINK_TARGET, "{}", line));
    let debug: LogSink = Arc::new(|line: &str| tracing::debug!(target: SINK_TARGET, "{}", line));
    (log, debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sinks_emit_tracing_events() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let (log, debug) = tracing_sinks();
        tracing::subscriber::with_default(subscriber, || {
            log("3 migrations to apply");
            debug("applying migration: 1 (create_users)");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("INFO rung: 3 migrations to apply"));
        assert!(!output.contains("applying migration"));
    }
}
