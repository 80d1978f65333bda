//! World-state data model shared by every layer of the decision engine.
//!
//! The surrounding simulation owns the `WorldState`; the engine reads a
//! snapshot each tick and returns a `Decision`. Nothing in here mutates the
//! world.

use serde::{Deserialize, Serialize};

/// Number of discrete movement actions: 8 compass directions plus hold.
pub const ACTION_COUNT: usize = 9;

/// Action index reserved for "hold position".
pub const ACTION_HOLD: usize = 0;

/// Fallback action when no safe direction exists: move left.
pub const ACTION_LEFT: usize = 7;

/// Unit movement vectors indexed by action. Index 0 is hold; 1..=8 walk the
/// compass clockwise from north. Diagonals are normalized.
pub const ACTION_VECTORS: [(f64, f64); ACTION_COUNT] = [
    (0.0, 0.0),                          // 0: hold
    (0.0, -1.0),                         // 1: up
    (std::f64::consts::FRAC_1_SQRT_2, -std::f64::consts::FRAC_1_SQRT_2), // 2: up-right
    (1.0, 0.0),                          // 3: right
    (std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2), // 4: down-right
    (0.0, 1.0),                          // 5: down
    (-std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2), // 6: down-left
    (-1.0, 0.0),                         // 7: left
    (-std::f64::consts::FRAC_1_SQRT_2, -std::f64::consts::FRAC_1_SQRT_2), // 8: up-left
];

/// Movement actions excluding hold, for branches that must keep moving.
pub const MOVEMENT_ACTIONS: [usize; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Hazard steering/speed families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Normal,
    Sprinter,
    Heavy,
    Zigzag,
    Tracker,
}

/// A moving obstacle. Contact with the player is a failure event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hazard {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    /// Unit direction of travel.
    pub dir_x: f64,
    pub dir_y: f64,
    /// Base speed in units per second.
    pub speed: f64,
    pub kind: HazardKind,
    /// Seconds since spawn, drives the zigzag phase.
    pub age: f64,
    /// Remaining lifetime in seconds.
    pub life: f64,
    /// Radians per second of allowed steering (trackers).
    pub turn_rate: f64,
    pub zigzag_amplitude: f64,
    pub zigzag_frequency: f64,
}

impl Hazard {
    pub fn velocity(&self) -> (f64, f64) {
        (self.dir_x * self.speed, self.dir_y * self.speed)
    }
}

/// Time-limited beneficial item collectible by proximity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    Heart,
    Shield,
    Speed,
    Points,
    Power,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pickup {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    /// Remaining lifetime in seconds.
    pub life: f64,
    pub max_life: f64,
    pub kind: PickupKind,
}

impl Pickup {
    pub fn life_ratio(&self) -> f64 {
        if self.max_life > 1e-9 {
            (self.life / self.max_life).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// The controlled avatar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub base_speed: f64,
    pub vx: f64,
    pub vy: f64,
}

/// Per-tick snapshot of the field, owned by the surrounding game loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldState {
    pub width: f64,
    pub height: f64,
    pub player: Player,
    pub hazards: Vec<Hazard>,
    pub pickups: Vec<Pickup>,
    /// Elapsed game time in seconds.
    pub elapsed: f64,
    pub lives: u32,
    pub max_lives: u32,
}

impl WorldState {
    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Current health as a fraction of maximum, clamped to [0, 1].
    pub fn life_ratio(&self) -> f64 {
        if self.max_lives == 0 {
            return 0.0;
        }
        (self.lives as f64 / self.max_lives as f64).clamp(0.0, 1.0)
    }

    /// Distance from the player to the nearest field boundary.
    pub fn nearest_edge_distance(&self) -> f64 {
        let p = &self.player;
        p.x.min(self.width - p.x).min(p.y).min(self.height - p.y)
    }
}

/// Sub-strategy tag for a pickup pursuit, derived from health tier, global
/// threat, and path safety.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PursuitStrategy {
    EmergencyHealth,
    Safe,
    Risky,
    Defensive,
    Calculated,
}

/// Which stage of the decision cascade produced the final action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBranch {
    Emergency,
    HighRisk,
    PickupPursuit(PursuitStrategy),
    PolicyGuided,
}

/// Output of a decision tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    /// Discrete action index in [0, 8].
    pub action: usize,
    /// Continuous speed multiplier.
    pub speed: f64,
    /// Movement vector for `action`, from the fixed lookup.
    pub vector: (f64, f64),
    /// Heuristic score per action, exposed for reward shaping.
    pub bias: [f64; ACTION_COUNT],
    /// Overall weight of the heuristic layer this tick.
    pub bias_strength: f64,
    pub branch: DecisionBranch,
}

#[inline]
pub fn distance(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// Normalize a vector, returning zero for degenerate input.
#[inline]
pub fn normalize(x: f64, y: f64) -> (f64, f64) {
    let mag = (x * x + y * y).sqrt();
    if mag > 1e-9 {
        (x / mag, y / mag)
    } else {
        (0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_vectors_are_unit_or_zero() {
        for (idx, (dx, dy)) in ACTION_VECTORS.iter().enumerate() {
            let mag = (dx * dx + dy * dy).sqrt();
            if idx == ACTION_HOLD {
                assert_eq!(mag, 0.0);
            } else {
                assert!((mag - 1.0).abs() < 1e-12, "action {idx} not unit");
            }
        }
    }

    #[test]
    fn normalize_handles_zero_vector() {
        assert_eq!(normalize(0.0, 0.0), (0.0, 0.0));
        let (x, y) = normalize(3.0, 4.0);
        assert!((x - 0.6).abs() < 1e-12);
        assert!((y - 0.8).abs() < 1e-12);
    }

    #[test]
    fn life_ratio_clamps() {
        let world = WorldState {
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
            elapsed: 0.0,
            lives: 5,
            max_lives: 3,
        };
        assert_eq!(world.life_ratio(), 1.0);
    }
}
