use super::refresh_interval;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info};

/// Typed accessors over the raw string settings table. A read for an unknown
/// key returns the type's default rather than an error (spec.md Data Model:
/// settings reads are total functions over their declared type).
#[derive(Debug, Default)]
struct Snapshot {
    values: HashMap<String, String>,
}

pub struct SettingsRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl SettingsRegistry {
    pub fn load(store: &dyn Store) -> Self {
        let snapshot = Self::fetch(store).unwrap_or_default();
        SettingsRegistry {
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    fn fetch(store: &dyn Store) -> Result<Snapshot, crate::store::StoreError> {
        let settings = store.list_settings()?;
        let values = settings.into_iter().map(|s| (s.name, s.value)).collect();
        Ok(Snapshot { values })
    }

    pub fn refresh(&self, store: &dyn Store) {
        match Self::fetch(store) {
            Ok(snapshot) => {
                *self.snapshot.write().unwrap() = Arc::new(snapshot);
            }
            Err(err) => {
                error!(error = %err, "settings registry refresh failed, retaining last snapshot");
            }
        }
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.snapshot.read().unwrap().values.get(name).cloned()
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get_string(name)
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(default)
    }

    pub fn get_u64(&self, name: &str, default: u64) -> u64 {
        self.get_string(name)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default)
    }

    /// `refresh_seconds` setting used to size the env/settings ticker period.
    pub fn refresh_interval(&self) -> Duration {
        refresh_interval(self.get_u64("refresh_seconds", 0))
    }
}

pub fn spawn_refresh_task(
    registry: Arc<SettingsRegistry>,
    store: Arc<dyn Store>,
    refresh_seconds: u64,
    mut shutdown: crate::event::EventConsumer<crate::event::ShutdownEvent>,
) -> tokio::task::JoinHandle<()> {
    let period = refresh_interval(refresh_seconds);
    tokio::spawn(async move {
        info!(?period, "settings registry refresh task started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => registry.refresh(store.as_ref()),
                _ = shutdown.recv() => {
                    info!("settings registry refresh task stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn unknown_setting_returns_declared_default() {
        let store = MemoryStore::new();
        let registry = SettingsRegistry::load(&store);
        assert_eq!(registry.get_u64("refresh_seconds", 42), 42);
        assert!(!registry.get_bool("feature_x", false));
    }

    #[test]
    fn refresh_picks_up_typed_values() {
        let store = MemoryStore::new();
        store.put_setting("refresh_seconds", "600");
        store.put_setting("feature_x", "true");

        let registry = SettingsRegistry::load(&store);
        registry.refresh(&store);

        assert_eq!(registry.get_u64("refresh_seconds", 0), 600);
        assert!(registry.get_bool("feature_x", false));
        assert_eq!(registry.refresh_interval(), Duration::from_secs(600));
    }
}
