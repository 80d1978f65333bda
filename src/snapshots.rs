//! Bounded weight-snapshot store.
//!
//! Keeps at most ten snapshots, evicting the lowest-performance entries, and
//! mirrors the list into a key-value storage seam as a best-effort side
//! effect. Corrupt or missing persisted data degrades to an empty store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::network::NetworkParameters;

/// Maximum retained snapshots.
pub const MAX_SNAPSHOTS: usize = 10;

/// Storage key the snapshot list is persisted under.
pub const STORE_KEY: &str = "weight-snapshots";

/// Key-value persistence seam. Both operations are best-effort: a miss or a
/// write failure is reported through the return value, never an error.
pub trait Storage {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: &str) -> bool;
}

/// One JSON file per key under a root directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn store(&self, key: &str, value: &str) -> bool {
        if fs::create_dir_all(&self.root).is_err() {
            warn!(root = %self.root.display(), "storage root unavailable");
            return false;
        }
        match fs::write(self.path_for(key), value) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, %err, "snapshot persistence failed");
                false
            }
        }
    }
}

/// In-memory storage for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStorage {
    map: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.map.borrow().get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) -> bool {
        self.map.borrow_mut().insert(key.to_string(), value.to_string());
        true
    }
}

/// Saved copy of all network parameters plus a performance tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub id: String,
    pub timestamp: u64,
    pub performance: f64,
    pub params: NetworkParameters,
}

/// Listing entry without the parameter payload.
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub performance: f64,
    pub timestamp: u64,
}

pub struct WeightStore {
    snapshots: Vec<WeightSnapshot>,
    next_id: u64,
}

impl WeightStore {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Append a timestamped snapshot, evict beyond the retention bound, and
    /// mirror the list into storage. Returns the snapshot id.
    pub fn save(
        &mut self,
        performance: f64,
        params: &NetworkParameters,
        storage: Option<&dyn Storage>,
    ) -> String {
        let id = format!("snapshot-{}", self.next_id);
        self.next_id += 1;
        self.snapshots.push(WeightSnapshot {
            id: id.clone(),
            timestamp: unix_now(),
            performance,
            params: params.clone(),
        });

        if self.snapshots.len() > MAX_SNAPSHOTS {
            self.snapshots
                .sort_by(|a, b| b.performance.total_cmp(&a.performance));
            self.snapshots.truncate(MAX_SNAPSHOTS);
        }

        if let Some(storage) = storage {
            self.persist(storage);
        }
        id
    }

    /// Parameters of the highest-performance snapshot.
    pub fn get_best(&self) -> Option<&NetworkParameters> {
        self.snapshots
            .iter()
            .max_by(|a, b| a.performance.total_cmp(&b.performance))
            .map(|snapshot| &snapshot.params)
    }

    pub fn load(&self, id: &str) -> Option<&NetworkParameters> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.id == id)
            .map(|snapshot| &snapshot.params)
    }

    pub fn list(&self) -> Vec<SnapshotInfo> {
        self.snapshots
            .iter()
            .map(|snapshot| SnapshotInfo {
                id: snapshot.id.clone(),
                performance: snapshot.performance,
                timestamp: snapshot.timestamp,
            })
            .collect()
    }

    /// Serialize the snapshot list into storage. Best-effort.
    pub fn persist(&self, storage: &dyn Storage) -> bool {
        match serde_json::to_string(&self.snapshots) {
            Ok(json) => storage.store(STORE_KEY, &json),
            Err(err) => {
                warn!(%err, "snapshot list failed to serialize");
                false
            }
        }
    }

    /// Rebuild the store from persisted data. Corrupt, malformed, or missing
    /// data resets to an empty store rather than propagating.
    pub fn load_from_storage(&mut self, storage: &dyn Storage) {
        self.snapshots.clear();
        let Some(raw) = storage.load(STORE_KEY) else {
            debug!("no persisted snapshots");
            return;
        };
        match serde_json::from_str::<Vec<WeightSnapshot>>(&raw) {
            Ok(snapshots) => {
                self.snapshots = snapshots
                    .into_iter()
                    .filter(|snapshot| snapshot.params.integrity_ok())
                    .collect();
                // Continue numbering past whatever survived, so a fresh save
                // never mints an id that collides with a retained one.
                self.next_id = highest_snapshot_index(&self.snapshots) + 1;
            }
            Err(err) => {
                warn!(%err, "persisted snapshots corrupt, starting empty");
            }
        }
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Highest numeric suffix among `snapshot-N` ids, 0 when none parse.
fn highest_snapshot_index(snapshots: &[WeightSnapshot]) -> u64 {
    snapshots
        .iter()
        .filter_map(|snapshot| snapshot.id.strip_prefix("snapshot-"))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use crate::network::Layer;

    /// Tiny parameter set so tests stay fast; shape integrity is checked
    /// against the real topology elsewhere.
    fn tiny_params(seed: u64) -> NetworkParameters {
        let mut rng = SmallRng::seed_from_u64(seed);
        NetworkParameters {
            input_layer: Layer::xavier(4, 4, &mut rng),
            hidden1: Layer::xavier(4, 4, &mut rng),
            hidden2: Layer::xavier(4, 4, &mut rng),
            hidden3: Layer::xavier(4, 4, &mut rng),
            value_head: Layer::xavier(4, 1, &mut rng),
            policy_head: Layer::xavier(4, 9, &mut rng),
        }
    }

    #[test]
    fn eviction_keeps_highest_performance() {
        let mut store = WeightStore::new();
        let params = tiny_params(1);
        for performance in 0..15 {
            store.save(performance as f64, &params, None);
        }
        assert_eq!(store.len(), MAX_SNAPSHOTS);
        let kept: Vec<f64> = store.list().iter().map(|s| s.performance).collect();
        for performance in 5..15 {
            assert!(kept.contains(&(performance as f64)));
        }
    }

    #[test]
    fn get_best_returns_top_performer() {
        let mut store = WeightStore::new();
        store.save(2.0, &tiny_params(1), None);
        let best_id = store.save(9.0, &tiny_params(2), None);
        store.save(5.0, &tiny_params(3), None);

        let best = store.get_best().unwrap();
        let by_id = store.load(&best_id).unwrap();
        assert_eq!(
            serde_json::to_string(best).unwrap(),
            serde_json::to_string(by_id).unwrap()
        );
    }

    #[test]
    fn load_unknown_id_is_none() {
        let store = WeightStore::new();
        assert!(store.load("snapshot-99").is_none());
    }

    #[test]
    fn restore_filters_wrong_topology_snapshots() {
        let storage = MemoryStorage::new();
        let mut store = WeightStore::new();
        store.save(3.5, &tiny_params(4), Some(&storage));

        let mut restored = WeightStore::new();
        restored.load_from_storage(&storage);
        // tiny params fail integrity validation against the real topology,
        // so the restored store drops them.
        assert!(restored.is_empty());
    }

    #[test]
    fn restored_counter_continues_past_retained_ids() {
        let snapshot = |id: &str| WeightSnapshot {
            id: id.to_string(),
            timestamp: 0,
            performance: 1.0,
            params: tiny_params(1),
        };
        // Eviction can leave gaps and keep high ids; the counter must clear
        // the highest survivor, not the list length.
        let kept = [snapshot("snapshot-11"), snapshot("snapshot-3")];
        assert_eq!(highest_snapshot_index(&kept), 11);
        assert_eq!(highest_snapshot_index(&[]), 0);
        assert_eq!(highest_snapshot_index(&[snapshot("imported")]), 0);
    }

    #[test]
    fn corrupt_persisted_data_degrades_to_empty() {
        let storage = MemoryStorage::new();
        storage.store(STORE_KEY, "not json at all {");
        let mut store = WeightStore::new();
        store.save(1.0, &tiny_params(5), None);
        store.load_from_storage(&storage);
        assert!(store.is_empty());
    }
}
