use super::refresh_interval;
use crate::store::{Environment, EnvironmentId, Store};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

#[derive(Debug, Default)]
struct Snapshot {
    by_id: HashMap<EnvironmentId, Environment>,
    by_name: HashMap<String, EnvironmentId>,
}

/// Environment definitions, refreshed from the [`Store`] on a timer rather
/// than read on every request. A failed refresh logs and keeps serving the
/// last good snapshot (spec.md Design Notes: refresh failure must not take
/// the server down or blank out known environments).
pub struct EnvRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl EnvRegistry {
    /// Loads an initial snapshot synchronously so the registry is never
    /// empty between construction and the first ticker fire.
    pub fn load(store: &dyn Store) -> Self {
        let snapshot = Self::fetch(store).unwrap_or_default();
        EnvRegistry {
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    fn fetch(store: &dyn Store) -> Result<Snapshot, crate::store::StoreError> {
        let environments = store.list_environments()?;
        let mut by_id = HashMap::with_capacity(environments.len());
        let mut by_name = HashMap::with_capacity(environments.len());
        for env in environments {
            by_name.insert(env.name.clone(), env.id);
            by_id.insert(env.id, env);
        }
        Ok(Snapshot { by_id, by_name })
    }

    pub fn refresh(&self, store: &dyn Store) {
        match Self::fetch(store) {
            Ok(snapshot) => {
                *self.snapshot.write().unwrap() = Arc::new(snapshot);
            }
            Err(err) => {
                error!(error = %err, "environment registry refresh failed, retaining last snapshot");
            }
        }
    }

    pub fn by_id(&self, id: EnvironmentId) -> Option<Environment> {
        self.snapshot.read().unwrap().by_id.get(&id).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Environment> {
        let snapshot = self.snapshot.read().unwrap();
        let id = snapshot.by_name.get(name)?;
        snapshot.by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().unwrap().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns the background ticker that periodically calls
/// [`EnvRegistry::refresh`]. Mirrors the teacher's pattern of a single
/// `tokio::spawn`'d loop driven by `tokio::time::interval`, exiting when the
/// shutdown event fires.
pub fn spawn_refresh_task(
    registry: Arc<EnvRegistry>,
    store: Arc<dyn Store>,
    refresh_seconds: u64,
    mut shutdown: crate::event::EventConsumer<crate::event::ShutdownEvent>,
) -> tokio::task::JoinHandle<()> {
    let period = refresh_interval(refresh_seconds);
    tokio::spawn(async move {
        info!(?period, "environment registry refresh task started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick fires immediately; the initial load already happened.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => registry.refresh(store.as_ref()),
                _ = shutdown.recv() => {
                    info!("environment registry refresh task stopping");
                    break;
                }
            }
        }
    })
}
