//! Pluggable log-sink dispatch: one primary sink, one always-on durable
//! sink, and a tail cache for UI display. Generalizes the teacher's
//! `DataStore`-style narrow capability trait to a log destination instead of
//! a generic data store — the same "no downcasts, no central switch"
//! redesign spec.md §9 calls for.

mod batch;
mod cache;
mod dbsink;
mod none;
mod rotating_file;
mod stdout;

pub use batch::{extract_identity, BatchIdentity, MixedBatchIdentity};
pub use cache::TailCache;
pub use dbsink::DbSink;
pub use none::NoneSink;
pub use rotating_file::RotatingFileSink;
pub use stdout::StdoutSink;

use crate::store::EnvironmentId;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Status,
    Result,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Status => "status",
            LogType::Result => "result",
        }
    }
}

/// A destination for log events: a remote service, a local file, a database
/// table, or discard. Every sink is both a send target and a feature toggle.
pub trait LogSink: Send + Sync {
    fn send(
        &self,
        log_type: LogType,
        data: &Value,
        env: &str,
        node_uuid: &str,
        debug: bool,
    ) -> Result<(), SinkError>;

    fn enabled(&self) -> bool;
}

/// Resolves a sink implementation by its configured kind string. No tagged
/// switch downstream of construction: callers hold a `Box<dyn LogSink>` from
/// here on.
pub fn build(kind: &str, rotating_dir: Option<&std::path::Path>) -> Result<Box<dyn LogSink>, String> {
    match kind {
        "stdout" => Ok(Box::new(StdoutSink)),
        "none" => Ok(Box::new(NoneSink)),
        "file" => {
            let dir = rotating_dir.ok_or_else(|| "file sink requires a directory".to_string())?;
            Ok(Box::new(RotatingFileSink::new(dir)?))
        }
        "db" => Ok(Box::new(DbSink)),
        other => Err(format!("unknown log sink kind `{other}`")),
    }
}

/// Fans a single ingest event out to the primary sink, the always-on durable
/// sink, and the tail cache — spec.md §4.5. Sink failures never fail the
/// caller's request.
pub struct LogDispatcher {
    primary: Box<dyn LogSink>,
    always_on: Box<dyn LogSink>,
    cache: Arc<TailCache>,
}

impl LogDispatcher {
    pub fn new(primary: Box<dyn LogSink>, always_on: Box<dyn LogSink>, cache: Arc<TailCache>) -> Self {
        LogDispatcher {
            primary,
            always_on,
            cache,
        }
    }

    pub fn log(
        &self,
        log_type: LogType,
        data: &Value,
        env_id: EnvironmentId,
        env_name: &str,
        node_uuid: &str,
        debug: bool,
    ) {
        if self.primary.enabled() {
            if let Err(err) = self.primary.send(log_type, data, env_name, node_uuid, debug) {
                warn!(error = %err, sink = "primary", "log sink send failed");
            }
        }
        if self.always_on.enabled() {
            if let Err(err) = self.always_on.send(log_type, data, env_name, node_uuid, debug) {
                warn!(error = %err, sink = "always_on", "log sink send failed");
            }
        }
        self.cache.push(env_id, node_uuid, log_type, data.clone());
    }

    /// Adds a query name and status to the payload before dispatch.
    pub fn query_log(
        &self,
        query_name: &str,
        status: i32,
        data: &Value,
        env_id: EnvironmentId,
        env_name: &str,
        node_uuid: &str,
        debug: bool,
    ) {
        let mut enriched = data.clone();
        if let Value::Object(map) = &mut enriched {
            map.insert("query_name".into(), Value::String(query_name.to_string()));
            map.insert("status".into(), Value::from(status));
        }
        self.log(LogType::Result, &enriched, env_id, env_name, node_uuid, debug);
    }
}

/// Builds the sink trio described by spec.md §4.5: a configured primary, an
/// always-on durable sink, and the tail cache. The always-on sink is a
/// [`RotatingFileSink`] of its own — the durable half of "always DB+file"
/// that survives a primary sink outage — not [`DbSink`], which is a stand-in
/// for an external database driver this crate doesn't ship.
pub struct SinkRegistry;

impl SinkRegistry {
    pub fn build_dispatcher(
        primary_kind: &str,
        rotating_dir: &std::path::Path,
        always_on_enabled: bool,
        always_on_dir: &std::path::Path,
        cache_capacity: usize,
    ) -> Result<LogDispatcher, String> {
        let primary = build(primary_kind, Some(rotating_dir))?;
        let always_on: Box<dyn LogSink> = if always_on_enabled {
            Box::new(RotatingFileSink::new(always_on_dir)?)
        } else {
            Box::new(NoneSink)
        };
        Ok(LogDispatcher::new(
            primary,
            always_on,
            Arc::new(TailCache::new(cache_capacity)),
        ))
    }
}
