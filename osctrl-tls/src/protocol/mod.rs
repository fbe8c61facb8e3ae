//! Wire request/response bodies for the agent protocol (spec.md §6). JSON
//! unless noted, `snake_case` field names to match the osquery-family agent
//! wire format.

pub mod script;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("gzip decode failed: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("unknown environment")]
    UnknownEnvironment,

    #[error("missing path variable `{0}`")]
    MissingPathVariable(&'static str),

    #[error("invalid secret")]
    InvalidSecret,

    #[error("enrollment disabled for this environment")]
    EnrollmentDisabled,

    #[error("secret path expired")]
    SecretPathExpired,

    #[error("secret path invalid")]
    SecretPathInvalid,

    #[error("unknown package kind `{0}`")]
    UnknownPackageKind(String),

    #[error("unknown script kind `{0}`")]
    UnknownScriptKind(String),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("node manager error: {0}")]
    Node(#[from] crate::node::NodeError),

    #[error("query manager error: {0}")]
    Query(#[from] crate::query::QueryError),

    #[error("carve engine error: {0}")]
    Carve(#[from] crate::carve::CarveError),

    #[error("package file unavailable: {0}")]
    PackageUnavailable(#[source] std::io::Error),
}

impl actix_web::ResponseError for ProtocolError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ProtocolError::MissingPathVariable(_) => StatusCode::BAD_REQUEST,
            ProtocolError::UnknownEnvironment => StatusCode::INTERNAL_SERVER_ERROR,
            ProtocolError::InvalidSecret | ProtocolError::SecretPathInvalid => StatusCode::FORBIDDEN,
            ProtocolError::EnrollmentDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ProtocolError::SecretPathExpired => StatusCode::INTERNAL_SERVER_ERROR,
            ProtocolError::MalformedBody(_)
            | ProtocolError::Gzip(_)
            | ProtocolError::Store(_)
            | ProtocolError::Node(_)
            | ProtocolError::Query(_)
            | ProtocolError::Carve(_)
            | ProtocolError::PackageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProtocolError::UnknownPackageKind(_) | ProtocolError::UnknownScriptKind(_) => {
                StatusCode::FORBIDDEN
            }
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(self.status_code()).finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsVersion {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    pub uuid: String,
    pub hostname: String,
    pub computer_name: String,
    #[serde(default)]
    pub hardware_vendor: String,
    #[serde(default)]
    pub hardware_model: String,
    #[serde(default)]
    pub hardware_serial: String,
    #[serde(default)]
    pub cpu_brand: String,
    #[serde(default)]
    pub physical_memory: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsqueryInfo {
    pub version: String,
    #[serde(default)]
    pub config_hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformInfo {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostDetails {
    pub os_version: OsVersion,
    pub system_info: SystemInfo,
    pub osquery_info: OsqueryInfo,
    #[serde(default)]
    pub platform_info: PlatformInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    pub enroll_secret: String,
    pub host_identifier: String,
    pub platform_type: String,
    pub host_details: HostDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollResponse {
    pub node_key: String,
    pub node_invalid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigRequest {
    pub node_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConfigResponse {
    Invalid { node_invalid: bool },
    Config(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireLogType {
    Status,
    Result,
}

impl From<WireLogType> for crate::logsink::LogType {
    fn from(value: WireLogType) -> Self {
        match value {
            WireLogType::Status => crate::logsink::LogType::Status,
            WireLogType::Result => crate::logsink::LogType::Result,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogRequest {
    pub node_key: String,
    pub log_type: WireLogType,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogResponse {
    pub node_invalid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryReadRequest {
    pub node_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReadResponse {
    pub queries: BTreeMap<String, String>,
    pub node_invalid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryWriteRequest {
    pub node_key: String,
    pub queries: BTreeMap<String, Value>,
    pub statuses: BTreeMap<String, i32>,
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryWriteResponse {
    pub node_invalid: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarveInitRequest {
    pub node_key: String,
    pub block_count: u64,
    pub block_size: u64,
    pub carve_size: u64,
    pub carve_id: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarveInitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarveBlockRequest {
    pub block_id: u64,
    pub session_id: String,
    pub request_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarveBlockResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretBody {
    pub secret: String,
}
