//! Pickup opportunity scoring.
//!
//! Each pickup gets a composite score (distance tier x type value x path
//! safety x timing x competition x strategic position). The best pickup
//! becomes the pursuit target when its score clears a threshold that relaxes
//! at low health or low global threat, and the pursuit carries a strategy
//! tag driving the composer's sub-behavior.

use crate::predict::{effective_velocity, predict_position};
use crate::threat::ThreatAssessment;
use crate::world::{distance, normalize, Pickup, PickupKind, PursuitStrategy, WorldState};

/// Steps simulated along the path to a pickup.
const PATH_STEPS: usize = 15;

/// Health fraction below which heart pickups become an emergency.
pub const EMERGENCY_HEALTH: f64 = 0.34;

/// Scored pursuit candidate.
#[derive(Clone, Copy, Debug)]
pub struct PickupPlan {
    pub index: usize,
    pub score: f64,
    pub path_safety: f64,
    pub strategy: PursuitStrategy,
}

/// Type indicator used in the feature vector, one distinct level per kind.
pub fn kind_indicator(kind: PickupKind) -> f64 {
    match kind {
        PickupKind::Heart => 1.0,
        PickupKind::Shield => 0.8,
        PickupKind::Power => 0.6,
        PickupKind::Speed => 0.4,
        PickupKind::Points => 0.2,
    }
}

/// Score every pickup and return the best plan if it clears the pursuit
/// threshold.
pub fn best_plan(world: &WorldState, assessment: &ThreatAssessment) -> Option<PickupPlan> {
    let mut best: Option<PickupPlan> = None;
    for (index, pickup) in world.pickups.iter().enumerate() {
        let path_safety = path_safety(world, pickup.x, pickup.y);
        let score = composite_score(world, assessment, pickup, path_safety);
        if best.map_or(true, |plan| score > plan.score) {
            best = Some(PickupPlan {
                index,
                score,
                path_safety,
                strategy: strategy_for(world, assessment, pickup, path_safety),
            });
        }
    }

    let plan = best?;
    if plan.score >= pursuit_threshold(world, assessment) {
        Some(plan)
    } else {
        None
    }
}

fn composite_score(
    world: &WorldState,
    assessment: &ThreatAssessment,
    pickup: &Pickup,
    path_safety: f64,
) -> f64 {
    let p = &world.player;
    let dist = distance(p.x, p.y, pickup.x, pickup.y);

    let distance_score = if dist < 100.0 {
        1.0
    } else if dist < 250.0 {
        0.7
    } else if dist < 450.0 {
        0.4
    } else {
        0.15
    };

    // Expiring pickups are worth chasing sooner; ones about to vanish before
    // the player could arrive are worth nothing.
    let travel_time = dist / (p.base_speed * 60.0).max(30.0);
    let timing = if pickup.life < travel_time {
        0.0
    } else {
        let urgency = 1.0 + (1.0 - pickup.life_ratio()) * 0.5;
        urgency * (1.0 - assessment.max_threat * 0.6).max(0.1)
    };

    distance_score
        * type_value(world, pickup.kind)
        * path_safety
        * timing
        * competition_factor(world, pickup)
        * strategic_position(world, pickup)
}

/// Type multiplier conditioned on current health.
fn type_value(world: &WorldState, kind: PickupKind) -> f64 {
    let health = world.life_ratio();
    match kind {
        PickupKind::Heart => {
            if health <= EMERGENCY_HEALTH {
                2.5
            } else if health < 0.7 {
                1.5
            } else {
                0.6
            }
        }
        PickupKind::Shield => {
            if health <= EMERGENCY_HEALTH {
                1.6
            } else {
                1.1
            }
        }
        PickupKind::Power => 1.0,
        PickupKind::Speed => 0.9,
        PickupKind::Points => {
            if health <= EMERGENCY_HEALTH {
                0.3
            } else {
                0.8
            }
        }
    }
}

/// Discount when a hazard is converging on the same pickup.
fn competition_factor(world: &WorldState, pickup: &Pickup) -> f64 {
    let mut factor = 1.0f64;
    for hazard in &world.hazards {
        let dist = distance(hazard.x, hazard.y, pickup.x, pickup.y);
        if dist > 250.0 {
            continue;
        }
        let (vx, vy) = effective_velocity(hazard, world, 0.25);
        let (vnx, vny) = normalize(vx, vy);
        let (tx, ty) = normalize(pickup.x - hazard.x, pickup.y - hazard.y);
        let alignment = (vnx * tx + vny * ty).max(0.0);
        factor *= 1.0 - alignment * (1.0 - dist / 250.0) * 0.7;
    }
    factor.max(0.1)
}

/// Centrality, room to escape, and clustering with other pickups.
fn strategic_position(world: &WorldState, pickup: &Pickup) -> f64 {
    let (cx, cy) = world.center();
    let max_dist = distance(0.0, 0.0, cx, cy).max(1.0);
    let centrality = 1.0 - distance(pickup.x, pickup.y, cx, cy) / max_dist * 0.5;

    let edge = pickup
        .x
        .min(world.width - pickup.x)
        .min(pickup.y)
        .min(world.height - pickup.y);
    let escape_room = (edge / 150.0).clamp(0.3, 1.0);

    let mut cluster = 1.0f64;
    for other in &world.pickups {
        let dist = distance(pickup.x, pickup.y, other.x, other.y);
        if dist > 1.0 && dist < 120.0 {
            cluster += 0.15;
        }
    }

    centrality * escape_room * cluster.min(1.5)
}

/// 15-step walk toward a target point, multiplying safety down whenever a
/// predicted hazard position encroaches.
pub fn path_safety(world: &WorldState, target_x: f64, target_y: f64) -> f64 {
    let p = &world.player;
    let total = distance(p.x, p.y, target_x, target_y);
    if total < 1.0 {
        return 1.0;
    }
    let (dir_x, dir_y) = normalize(target_x - p.x, target_y - p.y);
    let step_units = total / PATH_STEPS as f64;
    let step_time = step_units / (p.base_speed * 60.0).max(30.0);

    let mut safety = 1.0f64;
    for step in 1..=PATH_STEPS {
        let t = step as f64 * step_time;
        let px = p.x + dir_x * step_units * step as f64;
        let py = p.y + dir_y * step_units * step as f64;
        for hazard in &world.hazards {
            let (hx, hy) = predict_position(hazard, world, t);
            let dist = distance(px, py, hx, hy);
            let min_safe = p.radius + hazard.radius + 20.0;
            if dist < min_safe {
                safety *= (dist / min_safe).max(0.05);
            }
        }
        if safety < 0.05 {
            return safety;
        }
    }
    safety
}

/// Pursuit threshold: more permissive at low health or low threat.
fn pursuit_threshold(world: &WorldState, assessment: &ThreatAssessment) -> f64 {
    let health = world.life_ratio();
    let base = if health <= EMERGENCY_HEALTH {
        0.25
    } else if health < 0.7 {
        0.45
    } else {
        0.6
    };
    if assessment.max_threat < 0.3 {
        base * 0.8
    } else if assessment.max_threat > 0.7 {
        base * 1.4
    } else {
        base
    }
}

/// Strategy tag from health tier, global threat, and path safety.
fn strategy_for(
    world: &WorldState,
    assessment: &ThreatAssessment,
    pickup: &Pickup,
    path_safety: f64,
) -> PursuitStrategy {
    let health = world.life_ratio();
    if pickup.kind == PickupKind::Heart && health <= EMERGENCY_HEALTH {
        return PursuitStrategy::EmergencyHealth;
    }
    if assessment.max_threat > 0.6 {
        return PursuitStrategy::Defensive;
    }
    if path_safety > 0.75 && assessment.max_threat < 0.4 {
        return PursuitStrategy::Safe;
    }
    if path_safety < 0.35 {
        return PursuitStrategy::Risky;
    }
    PursuitStrategy::Calculated
}
