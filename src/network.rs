//! Hand-rolled feed-forward policy/value network.
//!
//! Fixed topology: 200 -> 1024 -> 1536 -> 1024 -> 768, then a 1-wide value
//! head and a 9-wide policy head off the shared 768 representation. Layers
//! are immutable-shape value types; "reinitialize" always replaces a whole
//! layer atomically, so a partially corrupted matrix cannot survive. A shape
//! mismatch at call time self-heals under a cooldown and degrades to a
//! uniform policy rather than faulting.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::features::FEATURE_COUNT;
use crate::world::ACTION_COUNT;

/// Hidden layer widths, input to output.
pub const HIDDEN_SIZES: [usize; 4] = [1024, 1536, 1024, 768];

/// Softmax temperature for the policy head.
pub const POLICY_TEMPERATURE: f64 = 1.2;

/// Forward calls that must elapse between two self-heal rebuilds of the same
/// layer.
pub const HEAL_COOLDOWN: u64 = 120;

/// One dense layer: `outputs` rows of `inputs` weights plus a bias per row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Layer {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
}

impl Layer {
    /// Xavier-initialized layer: symmetric uniform range scaled by
    /// `sqrt(6 / (fan_in + fan_out))`, with small symmetric biases.
    pub fn xavier(inputs: usize, outputs: usize, rng: &mut SmallRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..outputs)
            .map(|_| (0..inputs).map(|_| rng.gen_range(-limit..limit)).collect())
            .collect();
        let biases = (0..outputs).map(|_| rng.gen_range(-0.01..0.01)).collect();
        Self {
            inputs,
            outputs,
            weights,
            biases,
        }
    }

    /// Whether the stored matrix agrees with the declared shape.
    pub fn shape_ok(&self) -> bool {
        self.weights.len() == self.outputs
            && self.biases.len() == self.outputs
            && self.weights.iter().all(|row| row.len() == self.inputs)
    }

    /// Matrix-vector product plus bias. Caller guarantees `shape_ok` and a
    /// correctly sized input.
    fn apply(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(row, bias)| {
                let sum: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum();
                (sum + bias).tanh()
            })
            .collect()
    }
}

/// All six parameter sets, in forward order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub input_layer: Layer,
    pub hidden1: Layer,
    pub hidden2: Layer,
    pub hidden3: Layer,
    pub value_head: Layer,
    pub policy_head: Layer,
}

impl NetworkParameters {
    pub fn random(rng: &mut SmallRng) -> Self {
        Self {
            input_layer: Layer::xavier(FEATURE_COUNT, HIDDEN_SIZES[0], rng),
            hidden1: Layer::xavier(HIDDEN_SIZES[0], HIDDEN_SIZES[1], rng),
            hidden2: Layer::xavier(HIDDEN_SIZES[1], HIDDEN_SIZES[2], rng),
            hidden3: Layer::xavier(HIDDEN_SIZES[2], HIDDEN_SIZES[3], rng),
            value_head: Layer::xavier(HIDDEN_SIZES[3], 1, rng),
            policy_head: Layer::xavier(HIDDEN_SIZES[3], ACTION_COUNT, rng),
        }
    }

    /// Declared shapes for every layer, in order.
    pub fn expected_shapes() -> [(usize, usize); 6] {
        [
            (FEATURE_COUNT, HIDDEN_SIZES[0]),
            (HIDDEN_SIZES[0], HIDDEN_SIZES[1]),
            (HIDDEN_SIZES[1], HIDDEN_SIZES[2]),
            (HIDDEN_SIZES[2], HIDDEN_SIZES[3]),
            (HIDDEN_SIZES[3], 1),
            (HIDDEN_SIZES[3], ACTION_COUNT),
        ]
    }

    pub fn layers(&self) -> [&Layer; 6] {
        [
            &self.input_layer,
            &self.hidden1,
            &self.hidden2,
            &self.hidden3,
            &self.value_head,
            &self.policy_head,
        ]
    }

    /// All layers match their declared topology.
    pub fn integrity_ok(&self) -> bool {
        self.layers()
            .iter()
            .zip(Self::expected_shapes())
            .all(|(layer, (inputs, outputs))| {
                layer.inputs == inputs && layer.outputs == outputs && layer.shape_ok()
            })
    }
}

/// Value estimate plus action distribution for one forward pass.
#[derive(Clone, Debug)]
pub struct NetworkOutput {
    pub value: f64,
    pub policy: [f64; ACTION_COUNT],
}

impl NetworkOutput {
    /// Uniform fallback used whenever the forward pass aborts.
    pub fn uniform() -> Self {
        Self {
            value: 0.0,
            policy: [1.0 / ACTION_COUNT as f64; ACTION_COUNT],
        }
    }

    /// Highest-probability action, optionally excluding hold.
    pub fn best_action(&self, movement_only: bool) -> usize {
        let start = usize::from(movement_only);
        let mut best = start;
        for action in start..ACTION_COUNT {
            if self.policy[action] > self.policy[best] {
                best = action;
            }
        }
        best
    }
}

pub struct PolicyValueNetwork {
    params: NetworkParameters,
    rng: SmallRng,
    forward_calls: u64,
    /// Forward-call stamp of each layer's last rebuild; `None` until a layer
    /// has healed once, so the first rebuild is never throttled.
    last_heal: [Option<u64>; 6],
}

impl PolicyValueNetwork {
    pub fn new(seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let params = NetworkParameters::random(&mut rng);
        Self {
            params,
            rng,
            forward_calls: 0,
            last_heal: [None; 6],
        }
    }

    pub fn params(&self) -> &NetworkParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut NetworkParameters {
        &mut self.params
    }

    /// Atomically replace all six parameter sets (completed weight load).
    pub fn replace_params(&mut self, params: NetworkParameters) {
        self.params = params;
    }

    /// Reinitialize every layer from scratch.
    pub fn reinitialize(&mut self) {
        self.params = NetworkParameters::random(&mut self.rng);
        self.last_heal = [Some(self.forward_calls); 6];
    }

    /// Forward pass. Never faults: a layer whose shape drifted is rebuilt
    /// (subject to the heal cooldown) and this call degrades to value 0 and a
    /// uniform policy.
    pub fn forward(&mut self, features: &[f64]) -> NetworkOutput {
        self.forward_calls += 1;
        if features.len() != FEATURE_COUNT {
            return NetworkOutput::uniform();
        }

        if !self.heal_if_needed() {
            // A broken layer is still cooling down; degrade this tick.
            return NetworkOutput::uniform();
        }

        let h0 = self.params.input_layer.apply(features);
        let h1 = self.params.hidden1.apply(&h0);
        let h2 = self.params.hidden2.apply(&h1);
        let h3 = self.params.hidden3.apply(&h2);

        let value = self.params.value_head.apply(&h3)[0];
        let logits = raw_logits(&self.params.policy_head, &h3);
        NetworkOutput {
            value,
            policy: softmax(&logits, POLICY_TEMPERATURE),
        }
    }

    /// Rebuild any shape-drifted layer, unless that layer healed too
    /// recently. Returns false when the pass should abort.
    fn heal_if_needed(&mut self) -> bool {
        let shapes = NetworkParameters::expected_shapes();
        let mut ok = true;
        for (idx, (inputs, outputs)) in shapes.into_iter().enumerate() {
            let broken = {
                let layer = self.layer_at(idx);
                layer.inputs != inputs || layer.outputs != outputs || !layer.shape_ok()
            };
            if !broken {
                continue;
            }
            if let Some(last) = self.last_heal[idx] {
                if self.forward_calls.saturating_sub(last) < HEAL_COOLDOWN {
                    ok = false;
                    continue;
                }
            }
            warn!(layer = idx, "network layer shape drift, rebuilding");
            let fresh = Layer::xavier(inputs, outputs, &mut self.rng);
            *self.layer_at_mut(idx) = fresh;
            self.last_heal[idx] = Some(self.forward_calls);
        }
        ok
    }

    fn layer_at(&self, idx: usize) -> &Layer {
        match idx {
            0 => &self.params.input_layer,
            1 => &self.params.hidden1,
            2 => &self.params.hidden2,
            3 => &self.params.hidden3,
            4 => &self.params.value_head,
            _ => &self.params.policy_head,
        }
    }

    fn layer_at_mut(&mut self, idx: usize) -> &mut Layer {
        match idx {
            0 => &mut self.params.input_layer,
            1 => &mut self.params.hidden1,
            2 => &mut self.params.hidden2,
            3 => &mut self.params.hidden3,
            4 => &mut self.params.value_head,
            _ => &mut self.params.policy_head,
        }
    }
}

fn raw_logits(head: &Layer, hidden: &[f64]) -> Vec<f64> {
    head.weights
        .iter()
        .zip(&head.biases)
        .map(|(row, bias)| row.iter().zip(hidden).map(|(w, x)| w * x).sum::<f64>() + bias)
        .collect()
}

/// Temperature-scaled softmax over the 9 action logits, guarded against
/// degenerate input.
fn softmax(logits: &[f64], temperature: f64) -> [f64; ACTION_COUNT] {
    let mut out = [1.0 / ACTION_COUNT as f64; ACTION_COUNT];
    if logits.len() != ACTION_COUNT {
        return out;
    }
    let temp = temperature.max(1e-6);
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return out;
    }
    let mut sum = 0.0;
    let mut exps = [0.0f64; ACTION_COUNT];
    for (i, logit) in logits.iter().enumerate() {
        let e = ((logit - max) / temp).exp();
        exps[i] = e;
        sum += e;
    }
    if sum <= 1e-12 {
        return out;
    }
    for (slot, e) in out.iter_mut().zip(exps) {
        *slot = e / sum;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_returns_valid_distribution() {
        let mut network = PolicyValueNetwork::new(7);
        let features = vec![0.25; FEATURE_COUNT];
        let out = network.forward(&features);
        let sum: f64 = out.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(out.policy.iter().all(|p| *p >= 0.0));
        assert!(out.value >= -1.0 && out.value <= 1.0);
    }

    #[test]
    fn wrong_feature_length_degrades_to_uniform() {
        let mut network = PolicyValueNetwork::new(7);
        let out = network.forward(&[0.0; 10]);
        assert_eq!(out.value, 0.0);
        assert!(out
            .policy
            .iter()
            .all(|p| (*p - 1.0 / ACTION_COUNT as f64).abs() < 1e-12));
    }

    #[test]
    fn shape_drift_self_heals() {
        let mut network = PolicyValueNetwork::new(7);
        // Corrupt the policy head.
        network.params_mut().policy_head.weights.pop();
        assert!(!network.params().integrity_ok());

        let features = vec![0.1; FEATURE_COUNT];
        let out = network.forward(&features);
        // Healed on the spot; output is a real distribution again.
        assert!(network.params().integrity_ok());
        let sum: f64 = out.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn heal_cooldown_degrades_instead_of_thrashing() {
        let mut network = PolicyValueNetwork::new(7);
        network.params_mut().value_head.weights.pop();
        let features = vec![0.1; FEATURE_COUNT];
        let _ = network.forward(&features); // heals, stamps cooldown

        network.params_mut().value_head.weights.pop();
        let out = network.forward(&features); // still cooling down
        assert_eq!(out.value, 0.0);
        assert!(!network.params().integrity_ok());
    }

    #[test]
    fn xavier_weights_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(3);
        let layer = Layer::xavier(100, 50, &mut rng);
        let limit = (6.0 / 150.0f64).sqrt();
        assert!(layer.shape_ok());
        for row in &layer.weights {
            assert!(row.iter().all(|w| w.abs() <= limit));
        }
    }

    #[test]
    fn best_action_respects_movement_only() {
        let mut out = NetworkOutput::uniform();
        out.policy[0] = 0.9;
        out.policy[4] = 0.05;
        assert_eq!(out.best_action(false), 0);
        let movement = out.best_action(true);
        assert_ne!(movement, 0);
    }
}
