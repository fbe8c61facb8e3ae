use super::{LogSink, LogType, SinkError};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Writes one JSON line per event to a daily-rotating file. Grounded on the
/// teacher's `instrumentation::tracing_layers::file` use of
/// `tracing_appender::rolling`, reused here as a sink instead of a
/// `tracing::Layer`.
pub struct RotatingFileSink {
    appender: Mutex<RollingFileAppender>,
}

impl RotatingFileSink {
    pub fn new(dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, "osctrl-tls-logs");
        Ok(RotatingFileSink {
            appender: Mutex::new(appender),
        })
    }
}

impl LogSink for RotatingFileSink {
    fn send(
        &self,
        log_type: LogType,
        data: &Value,
        env: &str,
        node_uuid: &str,
        debug: bool,
    ) -> Result<(), SinkError> {
        let line = json!({
            "log_type": log_type.as_str(),
            "env": env,
            "node_uuid": node_uuid,
            "debug": debug,
            "data": data,
        });
        let mut appender = self.appender.lock().unwrap();
        writeln!(appender, "{line}")?;
        Ok(())
    }

    fn enabled(&self) -> bool {
        true
    }
}
