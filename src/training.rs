//! Offline self-improvement loop.
//!
//! Intentionally coarse: the update rule nudges only the value-head and
//! policy-head biases toward the TD error instead of backpropagating through
//! the hidden layers. The interface (experience intake, periodic train,
//! episode-boundary snapshotting) is the contract; the learning rule itself
//! is replaceable.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::network::PolicyValueNetwork;
use crate::replay::{experience_priority, Experience, ReplayBuffer};
use crate::snapshots::{Storage, WeightStore};
use crate::world::ACTION_COUNT;

/// Stored experiences required before `train` does anything.
pub const TRAIN_MIN_EXPERIENCES: usize = 100;
/// Samples consumed per training pass.
pub const TRAIN_BATCH: usize = 64;
/// TD discount factor.
pub const DISCOUNT: f64 = 0.99;
/// Bias nudge step size.
pub const LEARNING_RATE: f64 = 0.01;
/// Multiplicative exploration decay applied after each training pass.
pub const EXPLORATION_DECAY: f64 = 0.995;
/// Episode cadence for training passes.
pub const TRAIN_EVERY: u64 = 10;
/// Episode cadence for unconditional snapshots.
pub const SNAPSHOT_EVERY: u64 = 50;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingState {
    pub episodes: u64,
    pub total_reward: f64,
    pub best_performance: f64,
    pub average_performance: f64,
    pub exploration_rate: f64,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self {
            episodes: 0,
            total_reward: 0.0,
            best_performance: 0.0,
            average_performance: 0.0,
            exploration_rate: 0.3,
        }
    }
}

/// What an episode boundary did.
#[derive(Clone, Debug, Default)]
pub struct EpisodeOutcome {
    pub new_best: bool,
    pub trained: bool,
    pub snapshot_id: Option<String>,
}

#[derive(Default)]
pub struct Trainer {
    pub state: TrainingState,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one environment step with its computed sampling priority.
    pub fn add_experience(
        &self,
        buffer: &mut ReplayBuffer,
        state: Vec<f64>,
        action: usize,
        reward: f64,
        next_state: Option<Vec<f64>>,
        terminal: bool,
    ) {
        let priority = experience_priority(&state, reward, terminal);
        buffer.add(Experience {
            state,
            action,
            reward,
            next_state,
            terminal,
            priority,
        });
    }

    /// One training pass: no-op below the experience floor, otherwise sample
    /// a batch, compute TD targets, and nudge the head biases toward the
    /// value error. Returns the number of samples consumed.
    pub fn train(&mut self, network: &mut PolicyValueNetwork, buffer: &mut ReplayBuffer) -> usize {
        if buffer.len() < TRAIN_MIN_EXPERIENCES {
            return 0;
        }

        let batch = buffer.sample(TRAIN_BATCH);
        for experience in &batch {
            let target = match (&experience.next_state, experience.terminal) {
                (Some(next), false) => {
                    experience.reward + DISCOUNT * network.forward(next).value
                }
                _ => experience.reward,
            };
            let current = network.forward(&experience.state).value;
            let error = (target - current).clamp(-5.0, 5.0);

            let params = network.params_mut();
            for bias in &mut params.value_head.biases {
                *bias += LEARNING_RATE * error;
            }
            if experience.action < ACTION_COUNT {
                if let Some(bias) = params.policy_head.biases.get_mut(experience.action) {
                    *bias += LEARNING_RATE * error;
                }
            }
        }

        self.state.exploration_rate =
            (self.state.exploration_rate * EXPLORATION_DECAY).max(0.01);
        debug!(samples = batch.len(), "training pass complete");
        batch.len()
    }

    /// Close an episode: update running statistics, train on the configured
    /// cadence, and snapshot on the snapshot cadence or any new best score.
    pub fn end_episode(
        &mut self,
        score: f64,
        network: &mut PolicyValueNetwork,
        buffer: &mut ReplayBuffer,
        store: &mut WeightStore,
        storage: Option<&dyn Storage>,
    ) -> EpisodeOutcome {
        self.state.episodes += 1;
        self.state.total_reward += score;
        self.state.average_performance = self.state.total_reward / self.state.episodes as f64;

        let new_best = self.state.episodes == 1 || score > self.state.best_performance;
        if new_best {
            self.state.best_performance = score;
        }

        let mut outcome = EpisodeOutcome {
            new_best,
            ..EpisodeOutcome::default()
        };

        if self.state.episodes % TRAIN_EVERY == 0 {
            outcome.trained = self.train(network, buffer) > 0;
        }

        if self.state.episodes % SNAPSHOT_EVERY == 0 || new_best {
            let id = store.save(score, network.params(), storage);
            info!(
                episode = self.state.episodes,
                score, snapshot = %id, "saved weight snapshot"
            );
            outcome.snapshot_id = Some(id);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_buffer(count: usize) -> ReplayBuffer {
        let trainer = Trainer::new();
        let mut buffer = ReplayBuffer::new(1000, 9);
        for i in 0..count {
            trainer.add_experience(
                &mut buffer,
                vec![0.1; crate::features::FEATURE_COUNT],
                i % ACTION_COUNT,
                (i % 5) as f64 - 2.0,
                None,
                i % 17 == 0,
            );
        }
        buffer
    }

    #[test]
    fn train_is_noop_below_floor() {
        let mut trainer = Trainer::new();
        let mut network = PolicyValueNetwork::new(11);
        let mut buffer = filled_buffer(TRAIN_MIN_EXPERIENCES - 1);
        let exploration = trainer.state.exploration_rate;
        assert_eq!(trainer.train(&mut network, &mut buffer), 0);
        assert_eq!(trainer.state.exploration_rate, exploration);
    }

    #[test]
    fn train_decays_exploration_and_moves_biases() {
        let mut trainer = Trainer::new();
        let mut network = PolicyValueNetwork::new(11);
        let mut buffer = filled_buffer(TRAIN_MIN_EXPERIENCES);
        let before = network.params().value_head.biases[0];
        let exploration = trainer.state.exploration_rate;

        let used = trainer.train(&mut network, &mut buffer);
        assert_eq!(used, TRAIN_BATCH);
        assert!(trainer.state.exploration_rate < exploration);
        assert_ne!(network.params().value_head.biases[0], before);
    }

    #[test]
    fn episode_statistics_accumulate() {
        let mut trainer = Trainer::new();
        let mut network = PolicyValueNetwork::new(11);
        let mut buffer = ReplayBuffer::new(100, 9);
        let mut store = WeightStore::new();

        let first = trainer.end_episode(10.0, &mut network, &mut buffer, &mut store, None);
        assert!(first.new_best);
        assert!(first.snapshot_id.is_some());

        let worse = trainer.end_episode(4.0, &mut network, &mut buffer, &mut store, None);
        assert!(!worse.new_best);
        assert!(worse.snapshot_id.is_none());

        assert_eq!(trainer.state.episodes, 2);
        assert!((trainer.state.average_performance - 7.0).abs() < 1e-9);
        assert_eq!(trainer.state.best_performance, 10.0);
        assert_eq!(store.len(), 1);
    }
}
