/// Sink for decode warnings and audit traces.
///
/// The default [`LogSink`] forwards to the `log` facade. Tests swap in a
/// recording sink to assert on what was emitted.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, message: &str);
    fn debug(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn warn(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn debug(&self, message: &str) {
        log::debug!("{}", message);
    }
}
