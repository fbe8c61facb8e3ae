//! In-memory [`Store`] implementation. Suitable for tests and for
//! single-process deployments; a production deployment backs the same
//! trait with a real RDBMS without touching handler or manager code.

use super::types::*;
use super::{Store, StoreError};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    environments: HashMap<EnvironmentId, Environment>,
    settings: HashMap<String, String>,
    nodes: HashMap<i64, Node>,
    node_key_index: HashMap<NodeKey, i64>,
    archived: HashMap<(EnvironmentId, String), Vec<ArchivedNode>>,
    next_node_id: i64,
    queries: HashMap<String, DistributedQuery>,
    executed: HashSet<(String, String)>,
    query_executions: HashMap<(String, String), Vec<QueryExecution>>,
    carves: HashMap<String, CarveSession>,
    carve_requests: HashMap<String, String>,
    blocks: HashMap<String, Vec<CarveBlock>>,
    block_ids: HashSet<(String, u64)>,
    ingest: HashMap<IngestKey, IngestCounters>,
}

/// `RwLock`-guarded in-memory backend. Cloning the returned `Arc` wrapper is
/// how callers share one store across the refresh ticker and the request
/// handlers (the same shared-ownership shape as the env/settings snapshot).
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner {
                next_node_id: 1,
                ..Default::default()
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: insert or replace an environment definition.
    pub fn put_environment(&self, env: Environment) {
        let mut inner = self.inner.write().unwrap();
        inner.environments.insert(env.id, env);
    }

    /// Test/bootstrap helper: insert or replace a setting.
    pub fn put_setting(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.settings.insert(name.into(), value.into());
    }

    /// Test/bootstrap helper: schedule a distributed query.
    pub fn put_query(&self, query: DistributedQuery) {
        let mut inner = self.inner.write().unwrap();
        inner.queries.insert(query.name.clone(), query);
    }
}

impl Store for MemoryStore {
    fn list_environments(&self) -> Result<Vec<Environment>, StoreError> {
        Ok(self.inner.read().unwrap().environments.values().cloned().collect())
    }

    fn get_environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError> {
        Ok(self.inner.read().unwrap().environments.get(&id).cloned())
    }

    fn list_settings(&self) -> Result<Vec<Setting>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .settings
            .iter()
            .map(|(name, value)| Setting {
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn insert_node(&self, node: NewNode) -> Result<Node, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let id = inner.next_node_id;
        inner.next_node_id += 1;

        let row = Node {
            id,
            uuid: node.uuid,
            node_key: node.node_key.clone(),
            environment: node.environment,
            environment_id: node.environment_id,
            last_ip: node.last_ip,
            platform: node.platform,
            hostname: node.hostname,
            local_name: node.local_name,
            username: node.username,
            osquery_user: node.osquery_user,
            config_hash: node.config_hash,
            osquery_version: node.osquery_version,
            timestamps: NodeTimestamps {
                last_seen: Some(Utc::now()),
                ..Default::default()
            },
        };

        inner.node_key_index.insert(node.node_key, id);
        inner.nodes.insert(id, row.clone());
        Ok(row)
    }

    fn get_node_by_key(&self, key: &NodeKey) -> Result<Option<Node>, StoreError> {
        let inner = self.inner.read().unwrap();
        let Some(id) = inner.node_key_index.get(key) else {
            return Ok(None);
        };
        Ok(inner.nodes.get(id).cloned())
    }

    fn get_node_by_uuid(
        &self,
        env: &EnvironmentId,
        uuid: &str,
    ) -> Result<Option<Node>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .nodes
            .values()
            .find(|n| &n.environment_id == env && n.uuid == uuid)
            .cloned())
    }

    fn archive_node(&self, env: &EnvironmentId, uuid: &str, reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let Some(node_id) = inner
            .nodes
            .values()
            .find(|n| &n.environment_id == env && n.uuid == uuid)
            .map(|n| n.id)
        else {
            return Ok(());
        };
        if let Some(node) = inner.nodes.remove(&node_id) {
            inner.node_key_index.remove(&node.node_key);
            inner
                .archived
                .entry((*env, uuid.to_string()))
                .or_default()
                .push(ArchivedNode {
                    node,
                    reason: reason.to_string(),
                    archived_at: Utc::now(),
                });
        }
        Ok(())
    }

    fn archived_nodes_for_uuid(
        &self,
        env: &EnvironmentId,
        uuid: &str,
    ) -> Result<Vec<ArchivedNode>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut rows = inner
            .archived
            .get(&(*env, uuid.to_string()))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|r| r.archived_at);
        rows.reverse();
        Ok(rows)
    }

    fn touch_node(&self, key: &NodeKey, touch: NodeTouch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let Some(id) = inner.node_key_index.get(key).copied() else {
            // unknown node key: request never mutates node state.
            return Ok(());
        };
        let Some(node) = inner.nodes.get_mut(&id) else {
            return Ok(());
        };

        let now = Utc::now();
        if let Some(ip) = touch.ip {
            node.last_ip = Some(ip);
        }
        node.timestamps.last_seen = Some(now);
        match touch.kind {
            NodeTouchKind::Seen => {}
            NodeTouchKind::ConfigRefresh => node.timestamps.last_config = Some(now),
            NodeTouchKind::QueryReadRefresh => node.timestamps.last_query_read = Some(now),
            NodeTouchKind::QueryWriteRefresh => node.timestamps.last_query_write = Some(now),
            NodeTouchKind::CarveRefresh => node.timestamps.last_carve = Some(now),
            NodeTouchKind::LogStatus => node.timestamps.last_status = Some(now),
            NodeTouchKind::LogResult => node.timestamps.last_result = Some(now),
        }
        Ok(())
    }

    fn pending_queries_for(&self, node: &Node) -> Result<Vec<DistributedQuery>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut matches: Vec<DistributedQuery> = inner
            .queries
            .values()
            .filter(|q| q.active && !q.completed && !q.deleted)
            .filter(|q| targets_match(&q.targets, node))
            .filter(|q| !inner.executed.contains(&(q.name.clone(), node.uuid.clone())))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    fn get_query(&self, name: &str) -> Result<Option<DistributedQuery>, StoreError> {
        Ok(self.inner.read().unwrap().queries.get(name).cloned())
    }

    fn mark_query_executed(&self, query: &str, node_uuid: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.executed.insert((query.to_string(), node_uuid.to_string()));
        Ok(())
    }

    fn record_query_result(
        &self,
        query: &str,
        node_uuid: &str,
        status: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let Some(q) = inner.queries.get_mut(query) else {
            return Err(StoreError::NotFound(format!("query `{query}`")));
        };
        if status == 0 {
            q.executions += 1;
        } else {
            q.errors += 1;
        }

        let now = Utc::now();
        inner
            .query_executions
            .entry((query.to_string(), node_uuid.to_string()))
            .or_default()
            .push(QueryExecution {
                query_name: query.to_string(),
                node_uuid: node_uuid.to_string(),
                status,
                started_at: now,
                completed_at: Some(now),
            });
        Ok(())
    }

    fn query_executions_for(
        &self,
        query: &str,
        node_uuid: &str,
    ) -> Result<Vec<QueryExecution>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .query_executions
            .get(&(query.to_string(), node_uuid.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn init_carve(&self, session: NewCarveSession) -> Result<(), StoreError> {
        if session.total_blocks == 0 {
            return Err(StoreError::Conflict("total_blocks must be > 0".into()));
        }
        let mut inner = self.inner.write().unwrap();
        if inner.carves.contains_key(&session.session_id) {
            return Err(StoreError::Conflict(format!(
                "carve session `{}` already exists",
                session.session_id
            )));
        }
        inner
            .carve_requests
            .insert(session.request_id.clone(), session.session_id.clone());
        inner.carves.insert(
            session.session_id.clone(),
            CarveSession {
                session_id: session.session_id.clone(),
                request_id: session.request_id,
                carve_id: session.carve_id,
                node_uuid: session.node_uuid,
                environment: session.environment,
                total_blocks: session.total_blocks,
                block_size: session.block_size,
                carve_size: session.carve_size,
                completed_blocks: 0,
                status: CarveStatus::Initialized,
                destination_path: session.destination_path,
            },
        );
        inner.blocks.insert(session.session_id, Vec::new());
        Ok(())
    }

    fn get_carve_session(&self, id: &str) -> Result<Option<CarveSession>, StoreError> {
        Ok(self.inner.read().unwrap().carves.get(id).cloned())
    }

    fn write_carve_block(&self, block: NewCarveBlock) -> Result<CarveSession, StoreError> {
        let mut inner = self.inner.write().unwrap();

        let Some(expected_request) = inner.carve_requests.get(&block.request_id).cloned() else {
            return Err(StoreError::NotFound(format!(
                "no carve session for request `{}`",
                block.request_id
            )));
        };
        if expected_request != block.session_id {
            return Err(StoreError::NotFound(format!(
                "session/request mismatch for `{}`",
                block.session_id
            )));
        }

        let session = inner
            .carves
            .get(&block.session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("carve session `{}`", block.session_id)))?;

        // A resend of a block already stored is a no-op success regardless
        // of the session's current status — only a genuinely new block id
        // on a completed session is a conflict (spec.md §8 scenario 4).
        let dedupe_key = (block.session_id.clone(), block.block_id);
        if inner.block_ids.contains(&dedupe_key) {
            return Ok(session);
        }

        if session.status == CarveStatus::Completed {
            return Err(StoreError::Conflict(format!(
                "carve session `{}` already completed",
                block.session_id
            )));
        }

        inner.block_ids.insert(dedupe_key);
        inner
            .blocks
            .entry(block.session_id.clone())
            .or_default()
            .push(CarveBlock {
                session_id: block.session_id.clone(),
                block_id: block.block_id,
                data_b64: block.data_b64,
                environment: block.environment,
                received_at: Utc::now(),
            });

        let session = inner.carves.get_mut(&block.session_id).unwrap();
        session.completed_blocks += 1;
        session.status = if session.completed_blocks >= session.total_blocks {
            CarveStatus::Completed
        } else {
            CarveStatus::InProgress
        };
        Ok(session.clone())
    }

    fn carve_blocks_ordered(&self, session_id: &str) -> Result<Vec<CarveBlock>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut blocks = inner.blocks.get(session_id).cloned().unwrap_or_default();
        blocks.sort_by_key(|b| b.block_id);
        Ok(blocks)
    }

    fn record_ingest(&self, delta: IngestDelta) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let counters = inner.ingest.entry(delta.key).or_default();
        counters.events += 1;
        counters.bytes += delta.body_len;
        Ok(())
    }

    fn ingest_counters(&self, key: &IngestKey) -> Result<IngestCounters, StoreError> {
        Ok(self.inner.read().unwrap().ingest.get(key).copied().unwrap_or_default())
    }
}

fn targets_match(targets: &[QueryTarget], node: &Node) -> bool {
    targets.iter().any(|t| match t {
        QueryTarget::Environment(name) => name == &node.environment,
        QueryTarget::Platform(platform) => platform == &node.platform,
        QueryTarget::Uuid(uuid) => uuid == &node.uuid,
        QueryTarget::LocalName(name) => name == &node.local_name,
    })
}
