//! Autonomous pilot for a 2D hazard-dodging arena.
//!
//! The engine turns a world snapshot into one movement decision per tick:
//! a 200-value feature vector feeds a policy/value network, a kinematic
//! predictor anticipates hazard motion, layered threat heuristics gate a
//! priority cascade, and an experience-replay trainer improves the weights
//! between episodes. Weights round-trip through versioned JSON documents
//! and a bounded snapshot store.

pub mod agent;
pub mod features;
pub mod harness;
pub mod network;
pub mod persist;
pub mod pickups;
pub mod predict;
pub mod replay;
pub mod snapshots;
pub mod threat;
pub mod training;
pub mod world;

pub use agent::AutopilotAgent;
pub use harness::{run_episode, EpisodeMetrics, HarnessConfig};
pub use world::{Decision, DecisionBranch, WorldState};
