use super::{LogSink, LogType, SinkError};
use serde_json::Value;

/// Writes each log event to stdout as a JSON line via `tracing`, the same
/// way the teacher's own stdout instrumentation layer emits structured
/// fields.
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn send(
        &self,
        log_type: LogType,
        data: &Value,
        env: &str,
        node_uuid: &str,
        debug: bool,
    ) -> Result<(), SinkError> {
        tracing::info!(
            log_type = log_type.as_str(),
            env,
            node_uuid,
            debug,
            data = %data,
            "osquery log event"
        );
        Ok(())
    }

    fn enabled(&self) -> bool {
        true
    }
}
