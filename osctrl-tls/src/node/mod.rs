//! Node lifecycle: enroll, archive, lookup-by-key, metadata refresh, IP
//! tracking. Grounded on the teacher's small-transactional-operation style
//! (`agent_control`'s per-call `Result<_, AgentError>` methods) generalized
//! to the node-enrollment state machine this spec describes.

mod key;

use crate::store::{
    ArchivedNode, Environment, Node, NodeKey, NodeTouch, NodeTouchKind, NewNode, Store, StoreError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Everything an enroll request carries that the manager needs, already
/// flattened out of the wire `EnrollRequest` by the protocol layer.
#[derive(Debug, Clone)]
pub struct EnrollAttempt {
    pub host_identifier: String,
    pub platform: String,
    pub hostname: String,
    pub local_name: String,
    pub username: String,
    pub osquery_user: String,
    pub config_hash: String,
    pub osquery_version: String,
    pub source_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub node_invalid: bool,
}

pub struct NodeManager {
    store: Arc<dyn Store>,
}

impl NodeManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        NodeManager { store }
    }

    /// Enrolls a host into `env`. If a live node already exists for the
    /// same `(environment, host_identifier)`, it is archived with reason
    /// `"exists"` before the new row is written — spec.md §4.2.
    pub fn enroll(
        &self,
        env: &Environment,
        attempt: EnrollAttempt,
    ) -> Result<(NodeKey, EnrollOutcome), NodeError> {
        if let Some(existing) = self
            .store
            .get_node_by_uuid(&env.id, &attempt.host_identifier)?
        {
            self.store
                .archive_node(&env.id, &existing.uuid, "exists")?;
        }

        let node_key = key::generate(&attempt.host_identifier);

        self.store.insert_node(NewNode {
            uuid: attempt.host_identifier,
            node_key: node_key.clone(),
            environment: env.name.clone(),
            environment_id: env.id,
            last_ip: attempt.source_ip,
            platform: attempt.platform,
            hostname: attempt.hostname,
            local_name: attempt.local_name,
            username: attempt.username,
            osquery_user: attempt.osquery_user,
            config_hash: attempt.config_hash,
            osquery_version: attempt.osquery_version,
        })?;

        Ok((node_key, EnrollOutcome { node_invalid: false }))
    }

    /// A linear scan is behaviorally acceptable (spec.md §4.2 marks hash
    /// lookup as a perf concern, not a semantic one); the store indexes
    /// node keys internally so this call is O(1) in practice.
    pub fn get_by_key(&self, key: &NodeKey) -> Result<Option<Node>, NodeError> {
        Ok(self.store.get_node_by_key(key)?)
    }

    /// Every touch is side-effecting and non-fatal: an unknown key never
    /// mutates state, and a store error is logged rather than propagated so
    /// the response path always completes (spec.md §4.2, §7).
    fn touch(&self, key: &NodeKey, kind: NodeTouchKind, ip: Option<String>, body_len: u64) {
        if let Err(err) = self.store.touch_node(key, NodeTouch { kind, ip, body_len }) {
            warn!(error = %err, kind = ?kind, "node touch failed, continuing response path");
        }
    }

    pub fn record_ip_address(&self, key: &NodeKey, ip: String) {
        self.touch(key, NodeTouchKind::Seen, Some(ip), 0);
    }

    pub fn config_refresh(&self, key: &NodeKey, body_len: u64) {
        self.touch(key, NodeTouchKind::ConfigRefresh, None, body_len);
    }

    pub fn log_status_refresh(&self, key: &NodeKey, body_len: u64) {
        self.touch(key, NodeTouchKind::LogStatus, None, body_len);
    }

    pub fn log_result_refresh(&self, key: &NodeKey, body_len: u64) {
        self.touch(key, NodeTouchKind::LogResult, None, body_len);
    }

    pub fn query_read_refresh(&self, key: &NodeKey, body_len: u64) {
        self.touch(key, NodeTouchKind::QueryReadRefresh, None, body_len);
    }

    pub fn query_write_refresh(&self, key: &NodeKey, body_len: u64) {
        self.touch(key, NodeTouchKind::QueryWriteRefresh, None, body_len);
    }

    pub fn carve_refresh(&self, key: &NodeKey, body_len: u64) {
        self.touch(key, NodeTouchKind::CarveRefresh, None, body_len);
    }

    /// Same as [`Self::carve_refresh`] but for the (rarer) case where only
    /// the node's host UUID is known, not its node key.
    pub fn carve_refresh_by_uuid(&self, env: &Environment, uuid: &str, body_len: u64) {
        match self.store.get_node_by_uuid(&env.id, uuid) {
            Ok(Some(node)) => self.carve_refresh(&node.node_key, body_len),
            Ok(None) => warn!(uuid, "carve refresh for unknown node uuid"),
            Err(err) => error!(error = %err, uuid, "carve refresh lookup failed"),
        }
    }

    /// Idempotent: archiving an already-archived or nonexistent uuid is a
    /// no-op success.
    pub fn archive(&self, env: &Environment, uuid: &str, reason: &str) -> Result<(), NodeError> {
        Ok(self.store.archive_node(&env.id, uuid, reason)?)
    }

    /// Archived rows retained for `(env, uuid)`, most recent first — used by
    /// the admin plane's audit views and by this crate's own tests to check
    /// spec.md §8's "exactly one archived row" invariant.
    pub fn archived_for_uuid(
        &self,
        env: &Environment,
        uuid: &str,
    ) -> Result<Vec<ArchivedNode>, NodeError> {
        Ok(self.store.archived_nodes_for_uuid(&env.id, uuid)?)
    }
}
