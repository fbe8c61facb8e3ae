use super::LogType;
use crate::store::EnvironmentId;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// An ephemeral tail buffer for UI log tailing, not a source of truth
/// (spec.md §4.5). Capped per `(env, node_uuid, log_type)` key.
pub struct TailCache {
    capacity: usize,
    buffers: Mutex<HashMap<(EnvironmentId, String, &'static str), VecDeque<Value>>>,
}

impl TailCache {
    pub fn new(capacity: usize) -> Self {
        TailCache {
            capacity,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, env: EnvironmentId, node_uuid: &str, log_type: LogType, entry: Value) {
        let mut buffers = self.buffers.lock().unwrap();
        let key = (env, node_uuid.to_string(), log_type.as_str());
        let buffer = buffers.entry(key).or_default();
        buffer.push_back(entry);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    pub fn tail(&self, env: EnvironmentId, node_uuid: &str, log_type: LogType, n: usize) -> Vec<Value> {
        let buffers = self.buffers.lock().unwrap();
        let key = (env, node_uuid.to_string(), log_type.as_str());
        match buffers.get(&key) {
            Some(buffer) => buffer.iter().rev().take(n).rev().cloned().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_caps_at_capacity_and_keeps_most_recent() {
        let cache = TailCache::new(2);
        let env = EnvironmentId(uuid::Uuid::new_v4());
        cache.push(env, "HOST-1", LogType::Status, serde_json::json!(1));
        cache.push(env, "HOST-1", LogType::Status, serde_json::json!(2));
        cache.push(env, "HOST-1", LogType::Status, serde_json::json!(3));

        let tail = cache.tail(env, "HOST-1", LogType::Status, 10);
        assert_eq!(tail, vec![serde_json::json!(2), serde_json::json!(3)]);
    }

    #[test]
    fn keys_are_scoped_per_log_type() {
        let cache = TailCache::new(8);
        let env = EnvironmentId(uuid::Uuid::new_v4());
        cache.push(env, "HOST-1", LogType::Status, serde_json::json!("s"));
        cache.push(env, "HOST-1", LogType::Result, serde_json::json!("r"));

        assert_eq!(cache.tail(env, "HOST-1", LogType::Status, 10).len(), 1);
        assert_eq!(cache.tail(env, "HOST-1", LogType::Result, 10).len(), 1);
    }
}
