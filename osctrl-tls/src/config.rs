//! The `osctrl-tlsd` process configuration: one YAML file loaded at startup.
//! Grounded on the teacher's `config::config_loader` convention — a typed
//! struct deserialized by `serde_yaml`, every optional section carrying
//! `#[serde(default)]` so a minimal or empty file still produces a usable
//! configuration.

use crate::http::config::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Which primary [`crate::logsink::LogSink`] the dispatcher is built with.
/// `"none"`/`"stdout"`/`"file"` map onto the sinks this crate ships; the
/// wire drivers for remote backends (Splunk, Graylog, S3, Kinesis, Postgres)
/// are external collaborators out of scope for this engine (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    None,
    Stdout,
    File,
}

impl Default for LogSinkKind {
    fn default() -> Self {
        LogSinkKind::Stdout
    }
}

impl LogSinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSinkKind::None => "none",
            LogSinkKind::Stdout => "stdout",
            LogSinkKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSinkConfig {
    #[serde(default)]
    pub primary: LogSinkKind,
    /// Always-on durable sink, on by default per spec.md §9's "Always-on
    /// logger vs primary logger" design note.
    #[serde(default = "default_true")]
    pub always_on: bool,
    #[serde(default = "default_rotating_dir")]
    pub rotating_dir: PathBuf,
    /// Directory the always-on sink's rotating log lives under, kept
    /// separate from `rotating_dir` so a `primary: file` configuration
    /// doesn't interleave its rows with the durable audit copy.
    #[serde(default = "default_always_on_dir")]
    pub always_on_dir: PathBuf,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        LogSinkConfig {
            primary: LogSinkKind::default(),
            always_on: true,
            rotating_dir: default_rotating_dir(),
            always_on_dir: default_always_on_dir(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rotating_dir() -> PathBuf {
    PathBuf::from("/var/log/osctrl-tls")
}

fn default_always_on_dir() -> PathBuf {
    PathBuf::from("/var/log/osctrl-tls/always-on")
}

fn default_cache_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CarveConfig {
    /// Parent directory reassembled carve payloads are written under;
    /// joined with the session id (spec.md §4.4).
    #[serde(default = "default_carve_dir")]
    pub destination_dir: PathBuf,
}

impl Default for CarveConfig {
    fn default() -> Self {
        CarveConfig {
            destination_dir: default_carve_dir(),
        }
    }
}

fn default_carve_dir() -> PathBuf {
    PathBuf::from("/var/lib/osctrl-tls/carves")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logsink: LogSinkConfig,
    #[serde(default)]
    pub carve: CarveConfig,
    /// TLS hostname inlined into generated enroll/remove scripts.
    #[serde(default = "default_tls_host")]
    pub tls_host: String,
    /// Seed value for the env/settings refresh ticker period before the
    /// `SettingsRegistry`'s own `refresh_seconds` setting is loaded; `0`
    /// selects the 300s default (spec.md §4.1).
    #[serde(default)]
    pub refresh_seconds: u64,
}

fn default_tls_host() -> String {
    "localhost".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            logsink: LogSinkConfig::default(),
            carve: CarveConfig::default(),
            tls_host: default_tls_host(),
            refresh_seconds: 0,
        }
    }
}

impl AppConfig {
    /// Reads and parses the process's YAML config file through an injectable
    /// [`fs::file::reader::FileReader`], the same capability-trait boundary
    /// the carve reassembler uses for its side of the filesystem.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(&fs::LocalFile, path)
    }

    pub fn load_with(reader: &impl fs::file::reader::FileReader, path: &Path) -> Result<Self, ConfigError> {
        let raw = reader.read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_produces_defaults() {
        let config: AppConfig = serde_yaml::from_str("").unwrap();
        assert_eq!(config.logsink.primary, LogSinkKind::Stdout);
        assert!(config.logsink.always_on);
        assert_eq!(config.tls_host, "localhost");
    }

    #[test]
    fn overrides_merge_with_defaults() {
        let yaml = "tls_host: tls.example.com\nlogsink:\n  primary: file\n  always_on: false\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tls_host, "tls.example.com");
        assert_eq!(config.logsink.primary, LogSinkKind::File);
        assert!(!config.logsink.always_on);
        assert_eq!(config.carve.destination_dir, default_carve_dir());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load(Path::new("/does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
