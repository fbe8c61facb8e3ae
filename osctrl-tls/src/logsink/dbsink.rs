use super::{LogSink, LogType, SinkError};
use serde_json::Value;

/// Stand-in for a database-backed primary sink. The actual wire driver for
/// writing rows to the administrative database is one of the external
/// collaborators this crate treats as out of scope (spec.md §1); this sink
/// marks where that driver plugs in for an operator who selects
/// `logsink.primary: db`. The always-on durable sink never uses this —
/// [`super::RotatingFileSink`] covers that role since it actually persists.
pub struct DbSink;

impl LogSink for DbSink {
    fn send(
        &self,
        log_type: LogType,
        data: &Value,
        env: &str,
        node_uuid: &str,
        debug: bool,
    ) -> Result<(), SinkError> {
        tracing::debug!(
            log_type = log_type.as_str(),
            env,
            node_uuid,
            debug,
            data = %data,
            "always-on sink received event"
        );
        Ok(())
    }

    fn enabled(&self) -> bool {
        true
    }
}
