//! The explicit aggregate threaded through every handler in place of the
//! teacher's `AgentControlRunner`-style single top-level coordinator, itself
//! a generalization of the teacher's own pattern of building one owned
//! struct in `main` rather than relying on globals (spec.md §9, REDESIGN
//! FLAGS: "Global singletons for managers").

use crate::carve::CarveEngine;
use crate::ingest::IngestAccounting;
use crate::logsink::LogDispatcher;
use crate::node::NodeManager;
use crate::query::QueryManager;
use crate::registry::{EnvRegistry, SettingsRegistry};
use crate::store::Store;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a request handler needs. Constructed once in `main`, cloned
/// cheaply (every field is an `Arc` or owns only `Arc`s) into `actix_web`'s
/// `web::Data`.
pub struct Engine {
    pub store: Arc<dyn Store>,
    pub environments: Arc<EnvRegistry>,
    pub settings: Arc<SettingsRegistry>,
    pub nodes: NodeManager,
    pub queries: QueryManager,
    pub carve: Arc<CarveEngine>,
    pub dispatcher: LogDispatcher,
    pub accounting: IngestAccounting,
    pub tls_host: String,
    pub carve_destination_dir: PathBuf,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: LogDispatcher,
        tls_host: String,
        carve_destination_dir: PathBuf,
    ) -> Self {
        let environments = Arc::new(EnvRegistry::load(store.as_ref()));
        let settings = Arc::new(SettingsRegistry::load(store.as_ref()));
        let carve = Arc::new(CarveEngine::new(store.clone()));
        let nodes = NodeManager::new(store.clone());
        let queries = QueryManager::new(store.clone(), carve.clone());
        let accounting = IngestAccounting::new(store.clone());

        Engine {
            store,
            environments,
            settings,
            nodes,
            queries,
            carve,
            dispatcher,
            accounting,
            tls_host,
            carve_destination_dir,
        }
    }
}
