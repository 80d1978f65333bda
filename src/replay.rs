//! Experience replay buffer.
//!
//! Fixed-capacity ring: once full, new experiences overwrite the oldest
//! slot. Sampling blends the highest-priority entries with a uniform draw so
//! rare terminal/high-reward transitions dominate without starving the rest.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::features::{HAZARD_BLOCK_OFFSET, HAZARD_WIDTH, MAX_TRACKED_HAZARDS};

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Fraction of a sample drawn from the priority-ordered top.
const PRIORITY_FRACTION: f64 = 0.8;

/// One environment transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Option<Vec<f64>>,
    pub terminal: bool,
    pub priority: f64,
}

/// Sampling weight: absolute reward plus a terminal bonus, amplified when
/// the state was captured with hazards close by (read back out of the state
/// vector's hazard block).
pub fn experience_priority(state: &[f64], reward: f64, terminal: bool) -> f64 {
    let mut priority = reward.abs() + if terminal { 2.0 } else { 0.0 };

    // Distance weights live in the last value of each hazard slot; they are
    // near 1.0 when a hazard almost touches the player.
    let mut proximity = 0.0f64;
    for slot in 0..MAX_TRACKED_HAZARDS {
        let idx = HAZARD_BLOCK_OFFSET + slot * HAZARD_WIDTH + (HAZARD_WIDTH - 1);
        if let Some(weight) = state.get(idx) {
            proximity = proximity.max(*weight);
        }
    }
    if proximity > 0.5 {
        priority *= 1.0 + proximity;
    }
    priority.max(0.01)
}

pub struct ReplayBuffer {
    entries: Vec<Experience>,
    capacity: usize,
    /// Next slot to overwrite once the ring is full.
    write_cursor: usize,
    /// Monotonic insertion counter, breaks priority ties oldest-last.
    inserted: u64,
    insertion_order: Vec<u64>,
    rng: SmallRng,
}

impl ReplayBuffer {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(4096)),
            capacity: capacity.max(1),
            write_cursor: 0,
            inserted: 0,
            insertion_order: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn with_default_capacity(seed: u64) -> Self {
        Self::new(DEFAULT_CAPACITY, seed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
        self.write_cursor = 0;
    }

    /// Append, overwriting the oldest slot once at capacity.
    pub fn add(&mut self, experience: Experience) {
        self.inserted += 1;
        if self.entries.len() < self.capacity {
            self.entries.push(experience);
            self.insertion_order.push(self.inserted);
        } else {
            self.entries[self.write_cursor] = experience;
            self.insertion_order[self.write_cursor] = self.inserted;
            self.write_cursor = (self.write_cursor + 1) % self.capacity;
        }
    }

    /// Sample `n` experiences: everything when fewer are stored, otherwise
    /// the top 80% by priority (insertion order breaking ties) plus 20%
    /// drawn uniformly with replacement.
    pub fn sample(&mut self, n: usize) -> Vec<Experience> {
        if self.entries.len() <= n {
            return self.entries.clone();
        }

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            self.entries[b]
                .priority
                .total_cmp(&self.entries[a].priority)
                .then(self.insertion_order[a].cmp(&self.insertion_order[b]))
        });

        let top_count = ((n as f64) * PRIORITY_FRACTION).round() as usize;
        let mut out: Vec<Experience> = order
            .iter()
            .take(top_count.min(n))
            .map(|&idx| self.entries[idx].clone())
            .collect();

        while out.len() < n {
            let idx = self.rng.gen_range(0..self.entries.len());
            out.push(self.entries[idx].clone());
        }
        out
    }
}
