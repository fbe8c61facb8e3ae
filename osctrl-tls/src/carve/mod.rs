//! File-carve session tracking, block ingest, and ordered reassembly.
//! Grounded on the teacher's `fs` capability-trait pattern for the part that
//! actually touches the filesystem, and on `DataStore`'s small-transactional
//! calls for everything else.

mod reassembler;

pub use reassembler::{CarveReassembler, ReassembleError};

use crate::store::{CarveSession, NewCarveBlock, NewCarveSession, Store, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CarveError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CarveInit {
    pub session_id: String,
    pub request_id: String,
    pub carve_id: String,
    pub node_uuid: String,
    pub environment: String,
    pub total_blocks: u64,
    pub block_size: u64,
    pub carve_size: u64,
    pub destination_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CarveBlockSubmission {
    pub session_id: String,
    pub request_id: String,
    pub block_id: u64,
    pub data_b64: String,
    pub environment: String,
}

pub struct CarveEngine {
    store: Arc<dyn Store>,
}

impl CarveEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        CarveEngine { store }
    }

    /// Must be durable before returning: the agent begins posting blocks
    /// referencing `session_id` immediately after this call succeeds
    /// (spec.md §4.4).
    pub fn init(&self, init: CarveInit) -> Result<(), CarveError> {
        let destination_path = init.destination_dir.join(&init.session_id);
        Ok(self.store.init_carve(NewCarveSession {
            session_id: init.session_id,
            request_id: init.request_id,
            carve_id: init.carve_id,
            node_uuid: init.node_uuid,
            environment: init.environment,
            total_blocks: init.total_blocks,
            block_size: init.block_size,
            carve_size: init.carve_size,
            destination_path,
        })?)
    }

    /// Returns `false` (never an error) for a mismatched/unknown session so
    /// handlers can surface `{success:false}` without distinguishing store
    /// failures from protocol-level rejects, per spec.md §4.7's table.
    pub fn write_block(&self, submission: CarveBlockSubmission) -> Result<bool, CarveError> {
        match self.store.write_carve_block(NewCarveBlock {
            session_id: submission.session_id,
            request_id: submission.request_id,
            block_id: submission.block_id,
            data_b64: submission.data_b64,
            environment: submission.environment,
        }) {
            Ok(_session) => Ok(true),
            Err(StoreError::NotFound(_)) | Err(StoreError::Conflict(_)) => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    pub fn completed(&self, session_id: &str) -> Result<bool, CarveError> {
        Ok(self
            .store
            .get_carve_session(session_id)?
            .map(|s| s.is_complete())
            .unwrap_or(false))
    }

    /// Gate used by the block handler: `None` for both "no such session" and
    /// "request id does not match" — the handler doesn't need to tell those
    /// apart (spec.md §4.7).
    pub fn check_carve(
        &self,
        session_id: &str,
        request_id: &str,
    ) -> Result<Option<CarveSession>, CarveError> {
        let Some(session) = self.store.get_carve_session(session_id)? else {
            return Ok(None);
        };
        if session.request_id != request_id {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Scheduling hook invoked by [`crate::query::QueryManager`] when a
    /// reported query result belongs to a carve-flagged query. The engine
    /// itself has no further bookkeeping for this beyond the session created
    /// by the subsequent `carve/init` call, which arrives out-of-band from
    /// the agent.
    pub fn on_query_result(&self, node: &crate::store::Node, query_name: &str) {
        debug!(node = %node.uuid, query = query_name, "carve-flagged query result observed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn init(store: &Arc<MemoryStore>, session_id: &str, total_blocks: u64) -> CarveEngine {
        let engine = CarveEngine::new(store.clone());
        engine
            .init(CarveInit {
                session_id: session_id.into(),
                request_id: "rid".into(),
                carve_id: "cid".into(),
                node_uuid: "HOST-1".into(),
                environment: "prod".into(),
                total_blocks,
                block_size: 100,
                carve_size: total_blocks * 100,
                destination_dir: "/tmp/osctrl".into(),
            })
            .unwrap();
        engine
    }

    #[test]
    fn write_block_transitions_initialized_to_in_progress_to_completed() {
        let store = Arc::new(MemoryStore::new());
        let engine = init(&store, "sid", 2);

        assert!(!engine.completed("sid").unwrap());

        let ok = engine
            .write_block(CarveBlockSubmission {
                session_id: "sid".into(),
                request_id: "rid".into(),
                block_id: 0,
                data_b64: "AAAA".into(),
                environment: "prod".into(),
            })
            .unwrap();
        assert!(ok);
        assert!(!engine.completed("sid").unwrap());

        let ok = engine
            .write_block(CarveBlockSubmission {
                session_id: "sid".into(),
                request_id: "rid".into(),
                block_id: 1,
                data_b64: "BBBB".into(),
                environment: "prod".into(),
            })
            .unwrap();
        assert!(ok);
        assert!(engine.completed("sid").unwrap());
    }

    #[test]
    fn check_carve_rejects_request_id_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let engine = init(&store, "sid", 1);

        assert!(engine.check_carve("sid", "wrong-rid").unwrap().is_none());
        assert!(engine.check_carve("sid", "rid").unwrap().is_some());
    }

    #[test]
    fn write_block_for_unknown_session_returns_false_not_error() {
        let store = Arc::new(MemoryStore::new());
        let engine = CarveEngine::new(store);
        let ok = engine
            .write_block(CarveBlockSubmission {
                session_id: "missing".into(),
                request_id: "rid".into(),
                block_id: 0,
                data_b64: "AAAA".into(),
                environment: "prod".into(),
            })
            .unwrap();
        assert!(!ok);
    }
}
