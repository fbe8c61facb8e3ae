use super::{LogSink, LogType, SinkError};
use serde_json::Value;

/// Discards every event. Used when a deployment has no primary sink
/// configured, or as the always-on sink when audit duplication is disabled.
pub struct NoneSink;

impl LogSink for NoneSink {
    fn send(&self, _: LogType, _: &Value, _: &str, _: &str, _: bool) -> Result<(), SinkError> {
        Ok(())
    }

    fn enabled(&self) -> bool {
        false
    }
}
