//! Threat and safety analysis.
//!
//! Stateless per-call scoring built on the kinematic predictor: real-time
//! threat classification, lookahead direction safety, and the two-tier
//! boundary/center pressure model. The decision composer consumes these
//! directly; the feature extractor reuses the same falloff shapes so the
//! network and the heuristics see a consistent picture.

use crate::predict::{effective_velocity, predict_position, predict_tracker};
use crate::world::{
    distance, normalize, Hazard, HazardKind, WorldState, ACTION_VECTORS, MOVEMENT_ACTIONS,
};

/// Contact margin inside which a hazard counts as an immediate threat.
pub const IMMEDIATE_MARGIN: f64 = 30.0;
/// Outer margin of the current-distance danger falloff.
pub const DANGER_MARGIN: f64 = 80.0;
/// Outer margin of the 0.5 s predicted danger falloff.
pub const PREDICTED_MARGIN: f64 = 50.0;
/// Range inside which velocity alignment toward the player boosts danger.
pub const APPROACH_RANGE: f64 = 200.0;
/// Lookahead distance for the 8-way escape set.
pub const ESCAPE_LOOKAHEAD: f64 = 100.0;
/// Clearance an escape destination must keep from every hazard.
pub const ESCAPE_MARGIN: f64 = 60.0;
/// Width of the boundary comfort zone.
pub const EDGE_COMFORT: f64 = 200.0;
/// Edge proximity that forces center attraction to at least 0.8.
pub const EDGE_FORCE_RANGE: f64 = 150.0;

/// Aggregate threat classification for one tick.
#[derive(Clone, Debug)]
pub struct ThreatAssessment {
    /// Peak per-hazard danger right now.
    pub max_threat: f64,
    /// Peak per-hazard danger 0.5 s ahead.
    pub predicted_max: f64,
    pub immediate_danger: bool,
    pub high_risk: bool,
    pub predicted_danger: bool,
    /// Index into `world.hazards` of the nearest hazard, with its distance.
    pub nearest: Option<(usize, f64)>,
    /// Movement actions whose 100-unit destination stays in bounds and clear
    /// of every hazard.
    pub escape_actions: Vec<usize>,
}

impl ThreatAssessment {
    pub fn calm() -> Self {
        Self {
            max_threat: 0.0,
            predicted_max: 0.0,
            immediate_danger: false,
            high_risk: false,
            predicted_danger: false,
            nearest: None,
            escape_actions: MOVEMENT_ACTIONS.to_vec(),
        }
    }
}

/// Danger contribution of one hazard at its current position: 1.0 inside the
/// immediate margin, exponential falloff out to the danger margin, plus an
/// approach boost when the hazard's velocity points at the player.
pub fn hazard_threat(world: &WorldState, hazard: &Hazard) -> f64 {
    let p = &world.player;
    let dist = distance(p.x, p.y, hazard.x, hazard.y);
    let contact = p.radius + hazard.radius;
    let gap = dist - contact;

    let mut danger = if gap <= IMMEDIATE_MARGIN {
        1.0
    } else if gap <= DANGER_MARGIN {
        (-(gap - IMMEDIATE_MARGIN) / 25.0).exp()
    } else {
        0.0
    };

    if dist < APPROACH_RANGE {
        danger = (danger + approach_alignment(world, hazard) * 0.3).min(1.0);
    }
    danger
}

/// Danger of one hazard at its 0.5 s predicted position.
pub fn predicted_hazard_threat(world: &WorldState, hazard: &Hazard) -> f64 {
    let p = &world.player;
    let (hx, hy) = predict_position(hazard, world, 0.5);
    let gap = distance(p.x, p.y, hx, hy) - (p.radius + hazard.radius);
    if gap <= 0.0 {
        1.0
    } else if gap <= PREDICTED_MARGIN {
        (-gap / 20.0).exp()
    } else {
        0.0
    }
}

/// How squarely a hazard's velocity points at the player, in [0, 1].
fn approach_alignment(world: &WorldState, hazard: &Hazard) -> f64 {
    let (vx, vy) = effective_velocity(hazard, world, 0.25);
    let (vnx, vny) = normalize(vx, vy);
    if vnx == 0.0 && vny == 0.0 {
        return 0.0;
    }
    let (tx, ty) = normalize(world.player.x - hazard.x, world.player.y - hazard.y);
    (vnx * tx + vny * ty).max(0.0)
}

/// Classify the field: immediate danger above 0.8, high risk above 0.5,
/// predicted danger above 0.6, nearest hazard, and the safe escape set.
pub fn assess(world: &WorldState) -> ThreatAssessment {
    if world.hazards.is_empty() {
        return ThreatAssessment::calm();
    }

    let p = &world.player;
    let mut max_threat = 0.0f64;
    let mut predicted_max = 0.0f64;
    let mut nearest: Option<(usize, f64)> = None;

    for (idx, hazard) in world.hazards.iter().enumerate() {
        max_threat = max_threat.max(hazard_threat(world, hazard));
        predicted_max = predicted_max.max(predicted_hazard_threat(world, hazard));

        let dist = distance(p.x, p.y, hazard.x, hazard.y);
        if nearest.map_or(true, |(_, best)| dist < best) {
            nearest = Some((idx, dist));
        }
    }

    ThreatAssessment {
        max_threat,
        predicted_max,
        immediate_danger: max_threat > 0.8,
        high_risk: max_threat > 0.5,
        predicted_danger: predicted_max > 0.6,
        nearest,
        escape_actions: escape_actions(world),
    }
}

/// Movement actions whose 100-unit-ahead destination stays inside the field
/// and keeps `radius-sum + 60` clearance from every hazard's near-term
/// position.
pub fn escape_actions(world: &WorldState) -> Vec<usize> {
    let p = &world.player;
    let mut safe = Vec::new();

    'actions: for &action in &MOVEMENT_ACTIONS {
        let (dx, dy) = ACTION_VECTORS[action];
        let tx = p.x + dx * ESCAPE_LOOKAHEAD;
        let ty = p.y + dy * ESCAPE_LOOKAHEAD;

        if tx < p.radius || tx > world.width - p.radius || ty < p.radius
            || ty > world.height - p.radius
        {
            continue;
        }

        for hazard in &world.hazards {
            let clearance = p.radius + hazard.radius + ESCAPE_MARGIN;
            let (hx, hy) = predict_position(hazard, world, 0.5);
            if distance(tx, ty, hazard.x, hazard.y) < clearance
                || distance(tx, ty, hx, hy) < clearance
            {
                continue 'actions;
            }
        }
        safe.push(action);
    }
    safe
}

/// Walk 8 steps of 30 units along a candidate direction and score how safely
/// every hazard is avoided, in [0, 1]. Trackers are re-aimed at the simulated
/// future player position each step; other kinds follow their normal law.
/// Bails out once the running score drops below 0.1.
pub fn direction_safety(world: &WorldState, dir_x: f64, dir_y: f64) -> f64 {
    const STEPS: usize = 8;
    const STEP_UNITS: f64 = 30.0;

    let p = &world.player;
    // Seconds the player needs per 30-unit step at its base speed (the base
    // speed is a per-frame multiplier at a nominal 60 fps).
    let step_time = STEP_UNITS / (p.base_speed * 60.0).max(30.0);

    let mut safety = 1.0f64;
    for step in 1..=STEPS {
        let t = step as f64 * step_time;
        let px = p.x + dir_x * STEP_UNITS * step as f64;
        let py = p.y + dir_y * STEP_UNITS * step as f64;

        if px < p.radius || px > world.width - p.radius || py < p.radius
            || py > world.height - p.radius
        {
            safety *= 0.3;
        }

        for hazard in &world.hazards {
            let (hx, hy) = match hazard.kind {
                HazardKind::Tracker => predict_tracker(hazard, px, py, t),
                _ => predict_position(hazard, world, t),
            };
            let dist = distance(px, py, hx, hy);
            let min_safe = p.radius + hazard.radius + 12.0 + hazard.speed * 0.08;
            if dist < min_safe {
                safety *= (dist / min_safe).max(0.05);
            }
        }

        if safety < 0.1 {
            return safety;
        }
    }
    safety
}

/// Per-edge boundary pressure, each term nonlinear in proximity.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgePressure {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl EdgePressure {
    pub fn aggregate(&self) -> f64 {
        (self.left + self.right + self.top + self.bottom).min(1.0)
    }

    /// Inward push direction implied by the pressure, unnormalized.
    pub fn push_vector(&self) -> (f64, f64) {
        (self.left - self.right, self.top - self.bottom)
    }
}

/// Pressure grows as `((comfort - d) / comfort)^1.5` once the player is
/// inside the 200-unit comfort zone of an edge.
pub fn edge_pressure(world: &WorldState) -> EdgePressure {
    let p = &world.player;
    let term = |dist: f64| -> f64 {
        if dist >= EDGE_COMFORT {
            0.0
        } else {
            ((EDGE_COMFORT - dist.max(0.0)) / EDGE_COMFORT).powf(1.5)
        }
    };
    EdgePressure {
        left: term(p.x),
        right: term(world.width - p.x),
        top: term(p.y),
        bottom: term(world.height - p.y),
    }
}

/// Center attraction strength in [0, 1]: zero inside the comfort radius
/// (0.3 x min dimension), growing nonlinearly beyond it, and forced to at
/// least 0.8 whenever the player is within 150 units of any edge.
pub fn center_attraction(world: &WorldState) -> f64 {
    let (cx, cy) = world.center();
    let p = &world.player;
    let center_dist = distance(p.x, p.y, cx, cy);
    let comfort_radius = 0.3 * world.width.min(world.height);
    let max_dist = distance(0.0, 0.0, cx, cy);

    let mut attraction = if center_dist <= comfort_radius {
        0.0
    } else {
        let overshoot = (center_dist - comfort_radius) / (max_dist - comfort_radius).max(1.0);
        overshoot.clamp(0.0, 1.0).powf(1.5)
    };

    if world.nearest_edge_distance() < EDGE_FORCE_RANGE {
        attraction = attraction.max(0.8);
    }
    attraction
}

/// Compose boundary/center pressure and live threats into a per-action bias
/// by dot-product alignment. Unsafe actions are penalized, never discarded;
/// the composer's final safety pass handles hard rejection.
pub fn directional_bias(world: &WorldState, assessment: &ThreatAssessment) -> [f64; 9] {
    let p = &world.player;
    let (cx, cy) = world.center();
    let (to_center_x, to_center_y) = normalize(cx - p.x, cy - p.y);
    let attraction = center_attraction(world);
    let pressure = edge_pressure(world);
    let (push_x, push_y) = pressure.push_vector();
    let (push_nx, push_ny) = normalize(push_x, push_y);

    let away = assessment
        .nearest
        .and_then(|(idx, _)| world.hazards.get(idx))
        .map(|hazard| normalize(p.x - hazard.x, p.y - hazard.y))
        .unwrap_or((0.0, 0.0));

    let mut bias = [0.0f64; 9];
    for (action, slot) in bias.iter_mut().enumerate() {
        let (dx, dy) = ACTION_VECTORS[action];
        let center_align = dx * to_center_x + dy * to_center_y;
        let push_align = dx * push_nx + dy * push_ny;
        let away_align = dx * away.0 + dy * away.1;

        *slot = center_align * attraction
            + push_align * pressure.aggregate()
            + away_align * assessment.max_threat;
    }
    bias
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Player, ACTION_HOLD};

    fn world_with(hazards: Vec<Hazard>) -> WorldState {
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
            hazards,
            pickups: Vec::new(),
            elapsed: 10.0,
            lives: 3,
            max_lives: 3,
        }
    }

    fn hazard_at(x: f64, y: f64) -> Hazard {
        Hazard {
            x,
            y,
            radius: 12.0,
            dir_x: 1.0,
            dir_y: 0.0,
            speed: 80.0,
            kind: HazardKind::Normal,
            age: 1.0,
            life: 10.0,
            turn_rate: 0.0,
            zigzag_amplitude: 0.0,
            zigzag_frequency: 0.0,
        }
    }

    #[test]
    fn empty_field_is_calm() {
        let world = world_with(Vec::new());
        let assessment = assess(&world);
        assert!(!assessment.immediate_danger);
        assert!(!assessment.high_risk);
        assert_eq!(assessment.max_threat, 0.0);
        assert_eq!(assessment.escape_actions.len(), 8);
    }

    #[test]
    fn adjacent_hazard_triggers_immediate_danger() {
        // Gap of 20 units, inside the 30-unit immediate margin.
        let world = world_with(vec![hazard_at(400.0 + 15.0 + 12.0 + 20.0, 300.0)]);
        let assessment = assess(&world);
        assert!(assessment.immediate_danger);
        assert!(assessment.high_risk);
        assert_eq!(assessment.nearest.unwrap().0, 0);
    }

    #[test]
    fn escape_actions_avoid_the_hazard_side() {
        let world = world_with(vec![hazard_at(480.0, 300.0)]);
        let escapes = escape_actions(&world);
        assert!(!escapes.is_empty());
        // Straight right walks into the hazard.
        assert!(!escapes.contains(&3));
        assert!(!escapes.contains(&ACTION_HOLD));
    }

    #[test]
    fn direction_safety_prefers_open_space() {
        let world = world_with(vec![hazard_at(500.0, 300.0)]);
        let toward = direction_safety(&world, 1.0, 0.0);
        let away = direction_safety(&world, -1.0, 0.0);
        assert!(away > toward);
        assert!(away > 0.9);
    }

    #[test]
    fn edge_pressure_rises_near_boundary() {
        let mut world = world_with(Vec::new());
        assert_eq!(edge_pressure(&world).aggregate(), 0.0);
        world.player.x = 30.0;
        let pressure = edge_pressure(&world);
        assert!(pressure.left > 0.7);
        assert!(pressure.right.abs() < 1e-9);
        let (push_x, _) = pressure.push_vector();
        assert!(push_x > 0.0);
    }

    #[test]
    fn center_attraction_forced_near_edge() {
        let mut world = world_with(Vec::new());
        assert_eq!(center_attraction(&world), 0.0);
        world.player.x = 100.0; // inside EDGE_FORCE_RANGE of the left edge
        assert!(center_attraction(&world) >= 0.8);
    }

    #[test]
    fn directional_bias_points_away_from_pressure() {
        let mut world = world_with(Vec::new());
        world.player.x = 40.0;
        let bias = directional_bias(&world, &assess(&world));
        // Right (action 3) should outscore left (action 7).
        assert!(bias[3] > bias[7]);
    }
}
