//! Decision composer: the per-tick `decide` cascade.
//!
//! One explicit priority cascade per tick — emergency escape, high-risk
//! repositioning, pickup pursuit, then policy-guided movement — followed by
//! a hard safety pass, anti-oscillation correction, and the independent
//! speed law. Every rolling memory lives on the agent instance, so two
//! agents running side by side never interfere.

use std::collections::VecDeque;
use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::features;
use crate::network::{NetworkOutput, PolicyValueNetwork};
use crate::persist::{self, WeightSource};
use crate::pickups::{self, PickupPlan};
use crate::predict::predict_position;
use crate::replay::ReplayBuffer;
use crate::snapshots::{Storage, WeightStore};
use crate::threat::{self, ThreatAssessment};
use crate::training::{EpisodeOutcome, Trainer};
use crate::world::{
    distance, normalize, Decision, DecisionBranch, PursuitStrategy, WorldState, ACTION_COUNT,
    ACTION_HOLD, ACTION_LEFT, ACTION_VECTORS, MOVEMENT_ACTIONS,
};

/// Lookahead used when ranking emergency escape directions.
const EMERGENCY_LOOKAHEAD: f64 = 120.0;
/// Horizon for the high-risk predicted-safety ranking.
const HIGH_RISK_HORIZON: f64 = 0.7;
/// One-step distance checked by the final safety pass.
const SAFETY_STEP: f64 = 30.0;
/// Clearance margin enforced by the final safety pass.
const SAFETY_MARGIN: f64 = 30.0;
/// Rolling position-memory bound.
const POSITION_MEMORY: usize = 10;
/// Seconds of position memory retained.
const POSITION_WINDOW: f64 = 3.0;
/// Safe-to-stay thresholds: hazard distance, boundary distance.
const STAY_HAZARD_DIST: f64 = 180.0;
const STAY_EDGE_DIST: f64 = 120.0;

/// The complete decision engine: network, stores, and rolling memories.
pub struct AutopilotAgent {
    network: PolicyValueNetwork,
    buffer: ReplayBuffer,
    store: WeightStore,
    trainer: Trainer,
    rng: SmallRng,
    recent_positions: VecDeque<(f64, f64, f64)>,
    last_action: usize,
    last_features: Option<Vec<f64>>,
}

impl AutopilotAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            network: PolicyValueNetwork::new(seed),
            buffer: ReplayBuffer::with_default_capacity(seed ^ 0x9E37_79B9),
            store: WeightStore::new(),
            trainer: Trainer::new(),
            rng: SmallRng::seed_from_u64(seed ^ 0x517C_C1B7),
            recent_positions: VecDeque::with_capacity(POSITION_MEMORY),
            last_action: ACTION_HOLD,
            last_features: None,
        }
    }

    pub fn network(&self) -> &PolicyValueNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut PolicyValueNetwork {
        &mut self.network
    }

    pub fn store(&self) -> &WeightStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut WeightStore {
        &mut self.store
    }

    pub fn trainer(&self) -> &Trainer {
        &self.trainer
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Resolve startup weights: preset document, then best persisted
    /// snapshot, then the freshly initialized parameters.
    pub fn load_startup_weights(
        &mut self,
        preset_path: Option<&Path>,
        storage: Option<&dyn Storage>,
    ) -> WeightSource {
        if let Some(storage) = storage {
            self.store.load_from_storage(storage);
        }
        persist::load_startup_weights(
            &mut self.network,
            &mut self.trainer.state,
            preset_path,
            &self.store,
        )
    }

    /// The top-level decision operation. Always returns a well-formed
    /// decision for a well-formed world; internal anomalies degrade quality,
    /// never availability.
    pub fn decide(&mut self, world: &WorldState, difficulty: f64, training: bool) -> Decision {
        let features = features::extract(world, difficulty);
        let output = self.network.forward(&features);
        let assessment = threat::assess(world);
        let plan = pickups::best_plan(world, &assessment);

        let (raw_action, branch) = if assessment.immediate_danger {
            (self.emergency_action(world, &assessment), DecisionBranch::Emergency)
        } else if assessment.high_risk {
            (high_risk_action(world), DecisionBranch::HighRisk)
        } else if let Some(plan) = plan {
            (
                pursuit_action(world, &assessment, &plan),
                DecisionBranch::PickupPursuit(plan.strategy),
            )
        } else {
            (
                self.policy_action(world, &assessment, &output, training),
                DecisionBranch::PolicyGuided,
            )
        };

        let passed = safety_pass(world, raw_action, &assessment);
        let action = self.anti_oscillation(world, passed);
        let speed = speed_for(world, &assessment, action);
        let bias = heuristic_bias(world, &assessment, plan.as_ref());
        let bias_strength = (0.3
            + assessment.max_threat * 0.5
            + threat::edge_pressure(world).aggregate() * 0.2)
            .min(1.0);

        self.remember_position(world);
        self.last_action = action;
        self.last_features = Some(features);

        Decision {
            action,
            speed,
            vector: ACTION_VECTORS[action],
            bias,
            bias_strength,
            branch,
        }
    }

    /// Record the reward observed after the last `decide`, feeding the
    /// replay buffer. `next_world` is absent on terminal steps.
    pub fn observe(
        &mut self,
        reward: f64,
        next_world: Option<(&WorldState, f64)>,
        terminal: bool,
    ) {
        let Some(state) = self.last_features.take() else {
            return;
        };
        let next_state = next_world.map(|(world, difficulty)| features::extract(world, difficulty));
        self.trainer.add_experience(
            &mut self.buffer,
            state,
            self.last_action,
            reward,
            next_state,
            terminal,
        );
    }

    /// Close the episode: statistics, cadenced training, snapshotting.
    pub fn end_episode(&mut self, score: f64, storage: Option<&dyn Storage>) -> EpisodeOutcome {
        self.recent_positions.clear();
        self.last_features = None;
        self.trainer.end_episode(
            score,
            &mut self.network,
            &mut self.buffer,
            &mut self.store,
            storage,
        )
    }

    /// Force one training pass (harness/CLI use).
    pub fn train_now(&mut self) -> usize {
        self.trainer.train(&mut self.network, &mut self.buffer)
    }

    /// Escape direction maximizing distance to the nearest hazard at a
    /// 120-unit lookahead; falls back to the direct away-from-hazard vector.
    fn emergency_action(&mut self, world: &WorldState, assessment: &ThreatAssessment) -> usize {
        let p = &world.player;
        let Some((nearest_idx, _)) = assessment.nearest else {
            return ACTION_LEFT;
        };
        let hazard = &world.hazards[nearest_idx];

        let mut best: Option<(usize, f64)> = None;
        for &action in &assessment.escape_actions {
            let (dx, dy) = ACTION_VECTORS[action];
            let tx = p.x + dx * EMERGENCY_LOOKAHEAD;
            let ty = p.y + dy * EMERGENCY_LOOKAHEAD;
            let dist = distance(tx, ty, hazard.x, hazard.y);
            if best.map_or(true, |(_, d)| dist > d) {
                best = Some((action, dist));
            }
        }
        if let Some((action, _)) = best {
            return action;
        }

        let (ax, ay) = normalize(p.x - hazard.x, p.y - hazard.y);
        if ax == 0.0 && ay == 0.0 {
            ACTION_LEFT
        } else {
            vector_to_action(ax, ay)
        }
    }

    /// Policy-guided fallthrough with the center-pull override and the
    /// safe-to-stay hold.
    fn policy_action(
        &mut self,
        world: &WorldState,
        assessment: &ThreatAssessment,
        output: &NetworkOutput,
        training: bool,
    ) -> usize {
        if safe_to_stay(world, assessment) {
            return ACTION_HOLD;
        }

        if training && self.rng.gen::<f64>() < self.trainer.state.exploration_rate {
            return MOVEMENT_ACTIONS[self.rng.gen_range(0..MOVEMENT_ACTIONS.len())];
        }

        let p = &world.player;
        let (cx, cy) = world.center();
        let center_dist = distance(p.x, p.y, cx, cy);
        let max_dist = distance(0.0, 0.0, cx, cy).max(1.0);
        if center_dist > 0.6 * max_dist {
            let (tx, ty) = normalize(cx - p.x, cy - p.y);
            return vector_to_action(tx, ty);
        }

        output.best_action(assessment.predicted_danger)
    }

    /// Detect back-and-forth motion near a boundary and swap in one of the
    /// top-3 safest alternatives.
    fn anti_oscillation(&mut self, world: &WorldState, action: usize) -> usize {
        if self.recent_positions.len() < 6 || world.nearest_edge_distance() > 150.0 {
            return action;
        }

        let mut path_length = 0.0;
        let mut prev: Option<(f64, f64)> = None;
        for &(x, y, _) in &self.recent_positions {
            if let Some((px, py)) = prev {
                path_length += distance(px, py, x, y);
            }
            prev = Some((x, y));
        }
        let (first_x, first_y, _) = self.recent_positions[0];
        let (last_x, last_y, _) = self.recent_positions[self.recent_positions.len() - 1];
        let net = distance(first_x, first_y, last_x, last_y);

        // Lots of travel, no progress: oscillating against the wall.
        if path_length < 120.0 || net > 40.0 {
            return action;
        }

        let mut ranked: Vec<(usize, f64)> = MOVEMENT_ACTIONS
            .iter()
            .map(|&candidate| {
                let (dx, dy) = ACTION_VECTORS[candidate];
                (candidate, threat::direction_safety(world, dx, dy))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let p = &world.player;
        let (cx, cy) = world.center();
        let (tx, ty) = normalize(cx - p.x, cy - p.y);
        ranked
            .iter()
            .take(3)
            .max_by(|a, b| {
                let align = |&(candidate, _): &(usize, f64)| {
                    let (dx, dy) = ACTION_VECTORS[candidate];
                    dx * tx + dy * ty
                };
                align(a).total_cmp(&align(b))
            })
            .map(|&(candidate, _)| candidate)
            .unwrap_or(action)
    }

    fn remember_position(&mut self, world: &WorldState) {
        self.recent_positions
            .push_back((world.player.x, world.player.y, world.elapsed));
        while self.recent_positions.len() > POSITION_MEMORY {
            self.recent_positions.pop_front();
        }
        while let Some(&(_, _, t)) = self.recent_positions.front() {
            if world.elapsed - t > POSITION_WINDOW {
                self.recent_positions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// 8-way direction maximizing predicted clearance against every hazard at
/// the 0.7 s horizon.
fn high_risk_action(world: &WorldState) -> usize {
    let p = &world.player;
    let travel = (p.base_speed * 60.0).max(30.0) * HIGH_RISK_HORIZON;

    let mut best = ACTION_LEFT;
    let mut best_score = f64::NEG_INFINITY;
    for &action in &MOVEMENT_ACTIONS {
        let (dx, dy) = ACTION_VECTORS[action];
        let tx = (p.x + dx * travel).clamp(p.radius, world.width - p.radius);
        let ty = (p.y + dy * travel).clamp(p.radius, world.height - p.radius);

        let mut clearance = f64::MAX;
        for hazard in world.hazards.iter() {
            let (hx, hy) = predict_position(hazard, world, HIGH_RISK_HORIZON);
            clearance = clearance.min(distance(tx, ty, hx, hy) - (p.radius + hazard.radius));
        }
        // Penalize directions pinned against the wall.
        let edge = tx.min(world.width - tx).min(ty).min(world.height - ty);
        let score = clearance + edge.min(100.0) * 0.2;
        if score > best_score {
            best_score = score;
            best = action;
        }
    }
    best
}

/// Dispatch a pickup pursuit by its strategy tag.
fn pursuit_action(world: &WorldState, assessment: &ThreatAssessment, plan: &PickupPlan) -> usize {
    let p = &world.player;
    let Some(pickup) = world.pickups.get(plan.index) else {
        return ACTION_LEFT;
    };
    let (to_x, to_y) = normalize(pickup.x - p.x, pickup.y - p.y);
    let direct = vector_to_action(to_x, to_y);

    match plan.strategy {
        // Direct dash: health outweighs everything.
        PursuitStrategy::EmergencyHealth => direct,
        // Detour onto a neighboring heading when the direct line degrades.
        PursuitStrategy::Safe => {
            if plan.path_safety > 0.6 {
                direct
            } else {
                best_neighbor_by_safety(world, direct)
            }
        }
        // Corridor search: commit to whichever nearby heading is least bad.
        PursuitStrategy::Risky => best_neighbor_by_safety(world, direct),
        // Retreat first when pressure is on, approach once it lifts.
        PursuitStrategy::Defensive => {
            if assessment.max_threat > 0.5 {
                high_risk_action(world)
            } else {
                direct
            }
        }
        // Weigh approach alignment against walk safety over all headings.
        PursuitStrategy::Calculated => {
            let mut best = direct;
            let mut best_score = f64::NEG_INFINITY;
            for &action in &MOVEMENT_ACTIONS {
                let (dx, dy) = ACTION_VECTORS[action];
                let alignment = dx * to_x + dy * to_y;
                let score = threat::direction_safety(world, dx, dy) * 0.6 + alignment * 0.4;
                if score > best_score {
                    best_score = score;
                    best = action;
                }
            }
            best
        }
    }
}

/// Direct heading plus its two 45-degree neighbors, ranked by walk safety.
fn best_neighbor_by_safety(world: &WorldState, direct: usize) -> usize {
    // Movement actions 1..=8 are a clockwise compass ring.
    let ring = |action: usize, offset: i32| -> usize {
        let pos = action as i32 - 1;
        ((pos + offset).rem_euclid(8)) as usize + 1
    };
    let safety = |action: usize| {
        let (dx, dy) = ACTION_VECTORS[action];
        threat::direction_safety(world, dx, dy)
    };
    let mut best = direct;
    let mut best_score = safety(direct);
    for candidate in [ring(direct, -1), ring(direct, 1)] {
        let score = safety(candidate);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

/// Hard veto: an action whose one-step destination leaves the field or lands
/// within `radius-sum + 30` of a hazard is replaced by an escape or
/// center-seeking action.
fn safety_pass(world: &WorldState, action: usize, assessment: &ThreatAssessment) -> usize {
    if step_is_safe(world, action) {
        return action;
    }

    for &escape in &assessment.escape_actions {
        if step_is_safe(world, escape) {
            return escape;
        }
    }

    let p = &world.player;
    let (cx, cy) = world.center();
    let (tx, ty) = normalize(cx - p.x, cy - p.y);
    let centerward = vector_to_action(tx, ty);
    if step_is_safe(world, centerward) {
        centerward
    } else {
        ACTION_LEFT
    }
}

fn step_is_safe(world: &WorldState, action: usize) -> bool {
    let p = &world.player;
    let (dx, dy) = ACTION_VECTORS[action];
    let tx = p.x + dx * SAFETY_STEP;
    let ty = p.y + dy * SAFETY_STEP;

    if tx < p.radius || tx > world.width - p.radius || ty < p.radius
        || ty > world.height - p.radius
    {
        return false;
    }

    for hazard in &world.hazards {
        let limit = p.radius + hazard.radius + SAFETY_MARGIN;
        // Holding still is only unsafe against where hazards are headed.
        let (hx, hy) = if action == ACTION_HOLD {
            predict_position(hazard, world, 0.5)
        } else {
            (hazard.x, hazard.y)
        };
        if distance(tx, ty, hx, hy) < limit {
            return false;
        }
    }
    true
}

/// Conservative predicate allowing a full stop.
fn safe_to_stay(world: &WorldState, assessment: &ThreatAssessment) -> bool {
    let hazard_clear = assessment
        .nearest
        .map_or(true, |(_, dist)| dist > STAY_HAZARD_DIST);
    hazard_clear
        && world.nearest_edge_distance() > STAY_EDGE_DIST
        && world.life_ratio() > pickups::EMERGENCY_HEALTH
}

/// Independent speed law: health-tiered base plus additive urgency terms,
/// zero only under safe-to-stay, otherwise clamped to [1.0, 5.5].
fn speed_for(world: &WorldState, assessment: &ThreatAssessment, action: usize) -> f64 {
    if action == ACTION_HOLD && safe_to_stay(world, assessment) {
        return 0.0;
    }

    let health = world.life_ratio();
    let mut speed = if health <= pickups::EMERGENCY_HEALTH {
        2.4
    } else if health < 0.7 {
        2.0
    } else {
        1.6
    };

    if assessment.immediate_danger {
        speed += 1.2;
    }
    speed += assessment.max_threat * 0.8;

    let p = &world.player;
    let nearby = world
        .hazards
        .iter()
        .filter(|h| distance(p.x, p.y, h.x, h.y) < 150.0)
        .count();
    speed += (nearby as f64 * 0.15).min(0.6);

    let tracker_close = world.hazards.iter().any(|h| {
        h.kind == crate::world::HazardKind::Tracker && distance(p.x, p.y, h.x, h.y) < 200.0
    });
    if tracker_close {
        speed += 0.4;
    }

    speed += threat::edge_pressure(world).aggregate() * 0.5;
    if action != ACTION_HOLD {
        speed += 0.2;
    }

    speed.clamp(1.0, 5.5)
}

/// Heuristic score per action, exposed whole for reward shaping: boundary
/// and center pressure, threat avoidance, pickup approach, and a stay bonus
/// when stopping is genuinely safe.
fn heuristic_bias(
    world: &WorldState,
    assessment: &ThreatAssessment,
    plan: Option<&PickupPlan>,
) -> [f64; ACTION_COUNT] {
    let mut bias = threat::directional_bias(world, assessment);

    if let Some(plan) = plan {
        if let Some(pickup) = world.pickups.get(plan.index) {
            let p = &world.player;
            let (tx, ty) = normalize(pickup.x - p.x, pickup.y - p.y);
            for (action, slot) in bias.iter_mut().enumerate() {
                let (dx, dy) = ACTION_VECTORS[action];
                *slot += (dx * tx + dy * ty) * plan.score.min(1.5) * 0.5;
            }
        }
    }

    if safe_to_stay(world, assessment) {
        bias[ACTION_HOLD] += 0.5;
    }
    bias
}

/// Closest discrete movement action to an arbitrary direction.
fn vector_to_action(dx: f64, dy: f64) -> usize {
    let mut best = ACTION_LEFT;
    let mut best_dot = f64::NEG_INFINITY;
    for &action in &MOVEMENT_ACTIONS {
        let (ax, ay) = ACTION_VECTORS[action];
        let dot = ax * dx + ay * dy;
        if dot > best_dot {
            best_dot = dot;
            best = action;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Hazard, HazardKind, Player};

    fn base_world() -> WorldState {
        WorldState {
            width: 800.0,
            height: 600.0,
            player: Player {
                x: 400.0,
                y: 300.0,
                radius: 15.0,
                base_speed: 3.0,
                vx: 0.0,
                vy: 0.0,
            },
            hazards: Vec::new(),
            pickups: Vec::new(),
            elapsed: 15.0,
            lives: 3,
            max_lives: 3,
        }
    }

    #[test]
    fn vector_to_action_maps_cardinals() {
        assert_eq!(vector_to_action(1.0, 0.0), 3);
        assert_eq!(vector_to_action(-1.0, 0.0), 7);
        assert_eq!(vector_to_action(0.0, -1.0), 1);
        assert_eq!(vector_to_action(0.0, 1.0), 5);
    }

    #[test]
    fn safety_pass_rejects_boundary_walk() {
        let mut world = base_world();
        world.player.x = 20.0; // one step left exits the field
        let assessment = threat::assess(&world);
        let action = safety_pass(&world, ACTION_LEFT, &assessment);
        assert_ne!(action, ACTION_LEFT);
        assert!(step_is_safe(&world, action));
    }

    #[test]
    fn safety_pass_keeps_safe_actions() {
        let world = base_world();
        let assessment = threat::assess(&world);
        assert_eq!(safety_pass(&world, 3, &assessment), 3);
    }

    #[test]
    fn speed_is_zero_only_when_staying_is_safe() {
        let world = base_world();
        let assessment = threat::assess(&world);
        assert_eq!(speed_for(&world, &assessment, ACTION_HOLD), 0.0);

        let mut near_edge = base_world();
        near_edge.player.x = 50.0;
        let assessment = threat::assess(&near_edge);
        let speed = speed_for(&near_edge, &assessment, ACTION_HOLD);
        assert!(speed >= 1.0);
    }

    #[test]
    fn speed_rises_under_threat() {
        let mut world = base_world();
        let calm = speed_for(&world, &threat::assess(&world), 3);
        world.hazards.push(Hazard {
            x: 450.0,
            y: 300.0,
            radius: 12.0,
            dir_x: -1.0,
            dir_y: 0.0,
            speed: 120.0,
            kind: HazardKind::Tracker,
            age: 0.0,
            life: 10.0,
            turn_rate: 2.0,
            zigzag_amplitude: 0.0,
            zigzag_frequency: 0.0,
        });
        let pressed = speed_for(&world, &threat::assess(&world), 3);
        assert!(pressed > calm);
        assert!(pressed <= 5.5);
    }

    #[test]
    fn heuristic_bias_covers_all_actions() {
        let world = base_world();
        let assessment = threat::assess(&world);
        let bias = heuristic_bias(&world, &assessment, None);
        assert_eq!(bias.len(), ACTION_COUNT);
        // At a calm center, staying put is the favored bias.
        let max = bias.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(bias[ACTION_HOLD], max);
    }

    #[test]
    fn ring_neighbors_wrap() {
        assert_eq!(best_neighbor_by_safety(&base_world(), 1), 1);
    }
}
