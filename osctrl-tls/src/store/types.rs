//! The data model described in the Data Model section: environments, nodes,
//! distributed queries, carve sessions/blocks and ingest counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use uuid::Uuid;

/// Stable identifier for an [`Environment`]. Environments are resolved from
/// request URLs by this id, but snapshotted by name for log-dispatch lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentId(pub Uuid);

impl Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EnvironmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EnvironmentId(Uuid::parse_str(s)?))
    }
}

/// Opaque per-node token issued at enroll, required on every subsequent
/// agent request. Unpredictable, single-use-per-identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub String);

impl Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeKey {
    fn from(value: String) -> Self {
        NodeKey(value)
    }
}

/// Either a path local to the TLS server's filesystem, or an absolute URL
/// the agent should be redirected to (302) when fetching packages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageLocation {
    Local(PathBuf),
    Url(String),
}

/// Per-platform package locations (deb/rpm/pkg/msi).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageLocations {
    pub deb: Option<PackageLocation>,
    pub rpm: Option<PackageLocation>,
    pub pkg: Option<PackageLocation>,
    pub msi: Option<PackageLocation>,
}

impl PackageLocations {
    pub fn get(&self, kind: PackageKind) -> Option<&PackageLocation> {
        match kind {
            PackageKind::Deb => self.deb.as_ref(),
            PackageKind::Rpm => self.rpm.as_ref(),
            PackageKind::Pkg => self.pkg.as_ref(),
            PackageKind::Msi => self.msi.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Deb,
    Rpm,
    Pkg,
    Msi,
}

impl std::str::FromStr for PackageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deb" => Ok(PackageKind::Deb),
            "rpm" => Ok(PackageKind::Rpm),
            "pkg" => Ok(PackageKind::Pkg),
            "msi" => Ok(PackageKind::Msi),
            _ => Err(()),
        }
    }
}

/// A secret-protected URL path with an expiration, used for the
/// enroll/remove script and package download endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPath {
    pub path: String,
    pub expires_at: DateTime<Utc>,
}

impl SecretPath {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A logical tenancy scope: its own secret, certificate, configuration and
/// installer packages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvironmentId,
    pub name: String,
    pub enroll_secret: String,
    pub certificate: String,
    pub flags: String,
    pub enroll_secret_path: SecretPath,
    pub remove_secret_path: SecretPath,
    pub accepts_enrolls: bool,
    pub debug_http: bool,
    pub configuration: serde_json::Value,
    pub packages: PackageLocations,
}

/// A node's mutable-per-request timestamps, tracked to satisfy the
/// "node is alive/responsive" bookkeeping operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTimestamps {
    pub last_seen: Option<DateTime<Utc>>,
    pub last_config: Option<DateTime<Utc>>,
    pub last_status: Option<DateTime<Utc>>,
    pub last_result: Option<DateTime<Utc>>,
    pub last_query_read: Option<DateTime<Utc>>,
    pub last_query_write: Option<DateTime<Utc>>,
    pub last_carve: Option<DateTime<Utc>>,
}

/// A managed osquery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub uuid: String,
    pub node_key: NodeKey,
    pub environment: String,
    pub environment_id: EnvironmentId,
    pub last_ip: Option<String>,
    pub platform: String,
    pub hostname: String,
    pub local_name: String,
    pub username: String,
    pub osquery_user: String,
    pub config_hash: String,
    pub osquery_version: String,
    pub timestamps: NodeTimestamps,
}

/// What just happened to a node, for bookkeeping purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTouchKind {
    /// IP-address-only touch: bumps `last_seen` without a kind-specific
    /// timestamp. Used by `RecordIPAddress`, which spec.md §4.2 lists as its
    /// own operation distinct from the per-kind refreshes.
    Seen,
    ConfigRefresh,
    QueryReadRefresh,
    QueryWriteRefresh,
    CarveRefresh,
    LogStatus,
    LogResult,
}

#[derive(Debug, Clone)]
pub struct NodeTouch {
    pub kind: NodeTouchKind,
    pub ip: Option<String>,
    pub body_len: u64,
}

/// A node's prior identity, retained for audit once
/// [`super::Store::archive_node`] replaces it with a new enrollment row.
/// Archived rows are never returned by [`super::Store::get_node_by_key`] or
/// [`super::Store::get_node_by_uuid`] (spec.md §3: "archived nodes must be
/// kept for audit but must not respond to lookups").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedNode {
    pub node: Node,
    pub reason: String,
    pub archived_at: DateTime<Utc>,
}

/// Fields a fresh enroll supplies for a new (or re-enrolled) node row.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub uuid: String,
    pub node_key: NodeKey,
    pub environment: String,
    pub environment_id: EnvironmentId,
    pub last_ip: Option<String>,
    pub platform: String,
    pub hostname: String,
    pub local_name: String,
    pub username: String,
    pub osquery_user: String,
    pub config_hash: String,
    pub osquery_version: String,
}

/// What a distributed query targets: environment name, platform, host UUID,
/// or local name — possibly mixed within one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTarget {
    Environment(String),
    Platform(String),
    Uuid(String),
    LocalName(String),
}

/// An ad-hoc SQL statement scheduled to a subset of nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedQuery {
    pub name: String,
    pub sql: String,
    pub creator: String,
    pub targets: Vec<QueryTarget>,
    pub active: bool,
    pub completed: bool,
    pub deleted: bool,
    pub executions: u64,
    pub errors: u64,
    pub repeat_seconds: u64,
    pub carve: bool,
    pub created_at: DateTime<Utc>,
}

/// A single node's execution record for a [`DistributedQuery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExecution {
    pub query_name: String,
    pub node_uuid: String,
    pub status: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarveStatus {
    Initialized,
    InProgress,
    Completed,
    Failed,
}

/// A file-carve upload session: an agent streaming a large blob in
/// fixed-size blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarveSession {
    pub session_id: String,
    pub request_id: String,
    pub carve_id: String,
    pub node_uuid: String,
    pub environment: String,
    pub total_blocks: u64,
    pub block_size: u64,
    pub carve_size: u64,
    pub completed_blocks: u64,
    pub status: CarveStatus,
    pub destination_path: PathBuf,
}

impl CarveSession {
    pub fn is_complete(&self) -> bool {
        self.status == CarveStatus::Completed
    }
}

/// Parameters to start a new carve session. `completed_blocks` starts at
/// zero and `status` starts at `Initialized` by construction.
#[derive(Debug, Clone)]
pub struct NewCarveSession {
    pub session_id: String,
    pub request_id: String,
    pub carve_id: String,
    pub node_uuid: String,
    pub environment: String,
    pub total_blocks: u64,
    pub block_size: u64,
    pub carve_size: u64,
    pub destination_path: PathBuf,
}

/// A single block of a carve session's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarveBlock {
    pub session_id: String,
    pub block_id: u64,
    pub data_b64: String,
    pub environment: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCarveBlock {
    pub session_id: String,
    pub request_id: String,
    pub block_id: u64,
    pub data_b64: String,
    pub environment: String,
}

/// What an ingest event is attributed to: environment, node and message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestKind {
    Config,
    LogStatus,
    LogResult,
    QueryRead,
    QueryWrite,
    CarveInit,
    CarveBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IngestKey {
    pub environment_id: EnvironmentId,
    pub node_id: i64,
    pub kind: IngestKind,
}

/// A single request's worth of accounting to add to the running counters.
#[derive(Debug, Clone, Copy)]
pub struct IngestDelta {
    pub key: IngestKey,
    pub body_len: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestCounters {
    pub events: u64,
    pub bytes: u64,
}

/// A named runtime setting (interval, toggle, ...). Values are stored as
/// strings and parsed on read; a read for an unknown key returns the zero
/// value of its declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
}
