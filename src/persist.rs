//! Weight document export/import and startup weight resolution.
//!
//! The document is a versioned, human-readable JSON object holding the six
//! layer parameter sets plus training metadata. Export/import round-trips
//! losslessly for any well-formed document. Malformed or partially-present
//! documents never fault: missing layers keep their current in-memory
//! values, and only an outright integrity failure (a layer whose matrix
//! disagrees with its declared shape, or a broken layer chain) triggers full
//! reinitialization.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::features::FEATURE_COUNT;
use crate::network::{Layer, NetworkParameters, PolicyValueNetwork};
use crate::snapshots::WeightStore;
use crate::training::TrainingState;
use crate::world::ACTION_COUNT;

/// Current weight document format version.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightMetadata {
    pub episodes: u64,
    pub average_performance: f64,
    pub best_performance: f64,
    pub exploration_rate: f64,
    pub version: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightDocument {
    pub input_layer: Option<Layer>,
    pub hidden_layer1: Option<Layer>,
    pub hidden_layer2: Option<Layer>,
    pub hidden_layer3: Option<Layer>,
    pub value_head: Option<Layer>,
    pub policy_head: Option<Layer>,
    pub metadata: WeightMetadata,
}

/// What applying a document did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Layers merged and metadata adopted.
    Applied,
    /// Integrity validation failed outright; the network was rebuilt fresh.
    Reinitialized,
    /// The document was not valid structured data; nothing changed.
    Rejected,
}

/// Where the startup weights came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightSource {
    Preset,
    Persisted,
    Fresh,
}

/// Serialize the full parameter set and training metadata.
pub fn export_document(params: &NetworkParameters, training: &TrainingState) -> WeightDocument {
    WeightDocument {
        input_layer: Some(params.input_layer.clone()),
        hidden_layer1: Some(params.hidden1.clone()),
        hidden_layer2: Some(params.hidden2.clone()),
        hidden_layer3: Some(params.hidden3.clone()),
        value_head: Some(params.value_head.clone()),
        policy_head: Some(params.policy_head.clone()),
        metadata: WeightMetadata {
            episodes: training.episodes,
            average_performance: training.average_performance,
            best_performance: training.best_performance,
            exploration_rate: training.exploration_rate,
            version: DOCUMENT_VERSION,
        },
    }
}

pub fn export_json(params: &NetworkParameters, training: &TrainingState) -> Result<String> {
    serde_json::to_string(&export_document(params, training))
        .context("weight document serialization")
}

/// Parse and apply a weight document. Never faults: malformed input is
/// rejected, missing layers retain current values, and an integrity failure
/// reinitializes the whole network.
pub fn import_json(
    raw: &str,
    network: &mut PolicyValueNetwork,
    training: &mut TrainingState,
) -> ImportOutcome {
    let document: WeightDocument = match serde_json::from_str(raw) {
        Ok(document) => document,
        Err(err) => {
            warn!(%err, "weight document malformed, keeping current weights");
            return ImportOutcome::Rejected;
        }
    };
    apply_document(&document, network, training)
}

pub fn apply_document(
    document: &WeightDocument,
    network: &mut PolicyValueNetwork,
    training: &mut TrainingState,
) -> ImportOutcome {
    let mut merged = network.params().clone();
    merge_layer(&mut merged.input_layer, &document.input_layer);
    merge_layer(&mut merged.hidden1, &document.hidden_layer1);
    merge_layer(&mut merged.hidden2, &document.hidden_layer2);
    merge_layer(&mut merged.hidden3, &document.hidden_layer3);
    merge_layer(&mut merged.value_head, &document.value_head);
    merge_layer(&mut merged.policy_head, &document.policy_head);

    if !chain_ok(&merged) {
        warn!("weight document failed integrity validation, reinitializing");
        network.reinitialize();
        return ImportOutcome::Reinitialized;
    }

    network.replace_params(merged);
    training.episodes = document.metadata.episodes;
    training.average_performance = document.metadata.average_performance;
    training.best_performance = document.metadata.best_performance;
    training.total_reward =
        document.metadata.average_performance * document.metadata.episodes as f64;
    if document.metadata.exploration_rate > 0.0 {
        training.exploration_rate = document.metadata.exploration_rate;
    }
    ImportOutcome::Applied
}

fn merge_layer(current: &mut Layer, incoming: &Option<Layer>) {
    if let Some(layer) = incoming {
        *current = layer.clone();
    }
}

/// Integrity validation: every layer's matrix matches its declared shape and
/// the six layers chain from the 200-wide input to the 1-wide value head and
/// 9-wide policy head.
fn chain_ok(params: &NetworkParameters) -> bool {
    if !params.layers().iter().all(|layer| layer.shape_ok()) {
        return false;
    }
    params.input_layer.inputs == FEATURE_COUNT
        && params.hidden1.inputs == params.input_layer.outputs
        && params.hidden2.inputs == params.hidden1.outputs
        && params.hidden3.inputs == params.hidden2.outputs
        && params.value_head.inputs == params.hidden3.outputs
        && params.policy_head.inputs == params.hidden3.outputs
        && params.value_head.outputs == 1
        && params.policy_head.outputs == ACTION_COUNT
}

/// Resolve startup weights in priority order: a preset document at a
/// well-known path, then the best persisted snapshot, then freshly
/// initialized weights. Each failure is silent and non-fatal.
pub fn load_startup_weights(
    network: &mut PolicyValueNetwork,
    training: &mut TrainingState,
    preset_path: Option<&Path>,
    store: &WeightStore,
) -> WeightSource {
    if let Some(path) = preset_path {
        match fs::read_to_string(path) {
            Ok(raw) => {
                if import_json(&raw, network, training) == ImportOutcome::Applied {
                    info!(path = %path.display(), "loaded preset weights");
                    return WeightSource::Preset;
                }
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "preset weights unavailable");
            }
        }
    }

    if let Some(best) = store.get_best() {
        network.replace_params(best.clone());
        info!("loaded best persisted snapshot");
        return WeightSource::Persisted;
    }

    WeightSource::Fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// Chain-consistent parameter set with narrow hidden layers, cheap
    /// enough to serialize in tests.
    fn narrow_params(seed: u64) -> NetworkParameters {
        let mut rng = SmallRng::seed_from_u64(seed);
        NetworkParameters {
            input_layer: Layer::xavier(FEATURE_COUNT, 6, &mut rng),
            hidden1: Layer::xavier(6, 6, &mut rng),
            hidden2: Layer::xavier(6, 6, &mut rng),
            hidden3: Layer::xavier(6, 6, &mut rng),
            value_head: Layer::xavier(6, 1, &mut rng),
            policy_head: Layer::xavier(6, ACTION_COUNT, &mut rng),
        }
    }

    #[test]
    fn export_import_round_trips_layers_and_metadata() {
        let mut network = PolicyValueNetwork::new(21);
        network.replace_params(narrow_params(1));
        let training = TrainingState {
            episodes: 120,
            total_reward: 600.0,
            best_performance: 42.0,
            average_performance: 5.0,
            exploration_rate: 0.12,
        };
        let json = export_json(network.params(), &training).unwrap();

        let mut restored = PolicyValueNetwork::new(22);
        restored.replace_params(narrow_params(99));
        let mut restored_training = TrainingState::default();
        let outcome = import_json(&json, &mut restored, &mut restored_training);
        assert_eq!(outcome, ImportOutcome::Applied);

        assert_eq!(
            serde_json::to_string(network.params()).unwrap(),
            serde_json::to_string(restored.params()).unwrap()
        );
        assert_eq!(restored_training.episodes, 120);
        assert_eq!(restored_training.best_performance, 42.0);
        assert!((restored_training.exploration_rate - 0.12).abs() < 1e-12);
    }

    #[test]
    fn malformed_document_is_rejected_unchanged() {
        let mut network = PolicyValueNetwork::new(21);
        network.replace_params(narrow_params(2));
        let before = serde_json::to_string(network.params()).unwrap();
        let mut training = TrainingState::default();

        assert_eq!(
            import_json("{ not json", &mut network, &mut training),
            ImportOutcome::Rejected
        );
        assert_eq!(serde_json::to_string(network.params()).unwrap(), before);
    }

    #[test]
    fn missing_layers_keep_current_values() {
        let mut network = PolicyValueNetwork::new(21);
        network.replace_params(narrow_params(3));
        let original_policy = serde_json::to_string(&network.params().policy_head).unwrap();
        let mut training = TrainingState::default();

        // Document carrying only a replacement value head.
        let mut rng = SmallRng::seed_from_u64(50);
        let document = WeightDocument {
            value_head: Some(Layer::xavier(6, 1, &mut rng)),
            ..WeightDocument::default()
        };
        let raw = serde_json::to_string(&document).unwrap();
        assert_eq!(
            import_json(&raw, &mut network, &mut training),
            ImportOutcome::Applied
        );
        assert_eq!(
            serde_json::to_string(&network.params().policy_head).unwrap(),
            original_policy
        );
    }

    #[test]
    fn shape_fault_triggers_reinitialization() {
        let mut network = PolicyValueNetwork::new(21);
        network.replace_params(narrow_params(4));
        let mut training = TrainingState::default();

        let mut rng = SmallRng::seed_from_u64(51);
        let mut bad = Layer::xavier(6, 1, &mut rng);
        bad.weights.clear(); // declared 1 row, holds none
        let document = WeightDocument {
            value_head: Some(bad),
            ..WeightDocument::default()
        };
        let raw = serde_json::to_string(&document).unwrap();
        assert_eq!(
            import_json(&raw, &mut network, &mut training),
            ImportOutcome::Reinitialized
        );
        // Rebuilt at the full declared topology.
        assert!(network.params().integrity_ok());
    }

    #[test]
    fn startup_chain_falls_back_to_fresh() {
        let mut network = PolicyValueNetwork::new(21);
        let mut training = TrainingState::default();
        let store = WeightStore::new();
        let source = load_startup_weights(
            &mut network,
            &mut training,
            Some(Path::new("/nonexistent/preset.json")),
            &store,
        );
        assert_eq!(source, WeightSource::Fresh);
    }
}
