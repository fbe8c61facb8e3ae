//! The persistence capability the engine requires. Grounded on the
//! `DataStore` trait pattern: a narrow, serializable-data capability trait
//! with one production-shaped implementation, swappable in tests.

pub mod memory;
pub mod types;

pub use memory::MemoryStore;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: `{0}`")]
    NotFound(String),

    #[error("conflict: `{0}`")]
    Conflict(String),

    #[error("serialization error: `{0}`")]
    Serialization(String),

    #[error("io error: `{0}`")]
    Io(String),
}

/// Persistence of nodes, environments, queries, carves and ingestion
/// counters, with transactional updates where the spec requires them
/// (carve block write-and-count, node enroll/archive swap).
#[cfg_attr(test, mockall::automock)]
pub trait Store: Send + Sync {
    // -- environments & settings -------------------------------------------------
    fn list_environments(&self) -> Result<Vec<Environment>, StoreError>;
    fn get_environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError>;
    fn list_settings(&self) -> Result<Vec<Setting>, StoreError>;

    // -- nodes --------------------------------------------------------------------
    /// Insert a freshly-enrolled node. If a live node with the same
    /// `(environment, uuid)` already exists, the caller is expected to have
    /// archived it first via [`Store::archive_node`]; this call always
    /// creates a new row.
    fn insert_node(&self, node: NewNode) -> Result<Node, StoreError>;
    fn get_node_by_key(&self, key: &NodeKey) -> Result<Option<Node>, StoreError>;
    fn get_node_by_uuid(
        &self,
        env: &EnvironmentId,
        uuid: &str,
    ) -> Result<Option<Node>, StoreError>;
    fn archive_node(&self, env: &EnvironmentId, uuid: &str, reason: &str) -> Result<(), StoreError>;
    /// Archived rows retained for the prior identity at `(env, uuid)`, most
    /// recent first. Never consulted by `get_node_by_key`/`get_node_by_uuid`.
    fn archived_nodes_for_uuid(
        &self,
        env: &EnvironmentId,
        uuid: &str,
    ) -> Result<Vec<ArchivedNode>, StoreError>;
    fn touch_node(&self, key: &NodeKey, touch: NodeTouch) -> Result<(), StoreError>;

    // -- distributed queries --------------------------------------------------------
    fn pending_queries_for(&self, node: &Node) -> Result<Vec<DistributedQuery>, StoreError>;
    fn get_query(&self, name: &str) -> Result<Option<DistributedQuery>, StoreError>;
    fn mark_query_executed(&self, query: &str, node_uuid: &str) -> Result<(), StoreError>;
    /// Bumps the query's global `executions`/`errors` counters and persists a
    /// per-node [`QueryExecution`] row. Errors if `query` is unknown.
    fn record_query_result(
        &self,
        query: &str,
        node_uuid: &str,
        status: i32,
    ) -> Result<(), StoreError>;
    /// Persisted execution rows for `(query, node_uuid)`, oldest first.
    fn query_executions_for(
        &self,
        query: &str,
        node_uuid: &str,
    ) -> Result<Vec<QueryExecution>, StoreError>;

    // -- carves ---------------------------------------------------------------------
    fn init_carve(&self, session: NewCarveSession) -> Result<(), StoreError>;
    fn get_carve_session(&self, id: &str) -> Result<Option<CarveSession>, StoreError>;
    /// Persist a block and bump the session's completed-block counter
    /// atomically, returning the session's post-write state. Implementations
    /// must not count a block that failed to persist (spec.md §4.4).
    fn write_carve_block(&self, block: NewCarveBlock) -> Result<CarveSession, StoreError>;
    fn carve_blocks_ordered(&self, session_id: &str) -> Result<Vec<CarveBlock>, StoreError>;

    // -- ingest accounting ------------------------------------------------------------
    fn record_ingest(&self, delta: IngestDelta) -> Result<(), StoreError>;
    fn ingest_counters(&self, key: &IngestKey) -> Result<IngestCounters, StoreError>;
}
