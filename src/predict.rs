//! Closed-form hazard kinematics.
//!
//! Every higher layer (feature extraction, threat scoring, escape search)
//! predicts hazard motion through this one function, so all call sites agree
//! on where a hazard will be. Pure and deterministic for fixed inputs.

use crate::world::{normalize, Hazard, HazardKind, WorldState};

/// Predicted position of `hazard` after `dt` seconds.
///
/// Trackers re-aim toward the player's current position, with the angular
/// change bounded by `turn_rate * dt`. Zigzag hazards advance along their
/// base direction plus a sinusoidal perpendicular offset evaluated at the
/// hazard's accumulated age. All other kinds move linearly.
pub fn predict_position(hazard: &Hazard, world: &WorldState, dt: f64) -> (f64, f64) {
    match hazard.kind {
        HazardKind::Tracker => predict_tracker(hazard, world.player.x, world.player.y, dt),
        HazardKind::Zigzag => predict_zigzag(hazard, dt),
        _ => (
            hazard.x + hazard.dir_x * hazard.speed * dt,
            hazard.y + hazard.dir_y * hazard.speed * dt,
        ),
    }
}

/// Tracker prediction against an arbitrary target point. Direction safety
/// scoring aims trackers at the *simulated* future player position, so the
/// target is a parameter rather than always the live player.
pub fn predict_tracker(hazard: &Hazard, target_x: f64, target_y: f64, dt: f64) -> (f64, f64) {
    let (dx, dy) = turned_tracker_direction(hazard, target_x, target_y, dt);
    (
        hazard.x + dx * hazard.speed * dt,
        hazard.y + dy * hazard.speed * dt,
    )
}

/// Direction a tracker will be facing after steering toward the target for
/// `dt` seconds, with the swept angle capped at `turn_rate * dt`.
pub fn turned_tracker_direction(
    hazard: &Hazard,
    target_x: f64,
    target_y: f64,
    dt: f64,
) -> (f64, f64) {
    let (desired_x, desired_y) = normalize(target_x - hazard.x, target_y - hazard.y);
    if desired_x == 0.0 && desired_y == 0.0 {
        return (hazard.dir_x, hazard.dir_y);
    }

    let max_turn = hazard.turn_rate * dt;
    if max_turn <= 0.0 {
        return (hazard.dir_x, hazard.dir_y);
    }

    // Clamp the dot product before acos: accumulated float drift can push it
    // a hair outside [-1, 1].
    let dot = (hazard.dir_x * desired_x + hazard.dir_y * desired_y).clamp(-1.0, 1.0);
    let angle_between = dot.acos();
    if angle_between <= max_turn {
        return (desired_x, desired_y);
    }

    // Interpolate toward the desired heading by the allowed fraction, then
    // renormalize.
    let t = max_turn / angle_between;
    normalize(
        hazard.dir_x + (desired_x - hazard.dir_x) * t,
        hazard.dir_y + (desired_y - hazard.dir_y) * t,
    )
}

fn predict_zigzag(hazard: &Hazard, dt: f64) -> (f64, f64) {
    let base_x = hazard.x + hazard.dir_x * hazard.speed * dt;
    let base_y = hazard.y + hazard.dir_y * hazard.speed * dt;

    // Perpendicular to the travel direction, swinging with accumulated age.
    // The current position already contains the offset at `age`, so only the
    // swing accrued over `dt` is applied.
    let phase_now = hazard.age * hazard.zigzag_frequency;
    let phase_then = (hazard.age + dt) * hazard.zigzag_frequency;
    let offset = (phase_then.sin() - phase_now.sin()) * hazard.zigzag_amplitude;
    let (perp_x, perp_y) = (-hazard.dir_y, hazard.dir_x);
    (base_x + perp_x * offset, base_y + perp_y * offset)
}

/// Effective velocity over a short horizon, derived from the predictor so
/// tracker steering is reflected. Used for approach-alignment checks.
pub fn effective_velocity(hazard: &Hazard, world: &WorldState, dt: f64) -> (f64, f64) {
    let step = dt.max(1e-3);
    let (fx, fy) = predict_position(hazard, world, step);
    ((fx - hazard.x) / step, (fy - hazard.y) / step)
}

/// Time until two constant-velocity circles first touch, from relative
/// position, relative velocity, and combined radius. `None` when the paths
/// never close to contact.
pub fn time_to_collision(
    rel_x: f64,
    rel_y: f64,
    rel_vx: f64,
    rel_vy: f64,
    radius_sum: f64,
) -> Option<f64> {
    let c = rel_x * rel_x + rel_y * rel_y - radius_sum * radius_sum;
    if c <= 0.0 {
        // Already overlapping.
        return Some(0.0);
    }

    let a = rel_vx * rel_vx + rel_vy * rel_vy;
    let b = 2.0 * (rel_x * rel_vx + rel_y * rel_vy);
    if a <= 1e-9 {
        return None;
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }

    let t = (-b - disc.sqrt()) / (2.0 * a);
    if t >= 0.0 {
        Some(t)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Player, WorldState};

    fn test_world() -> WorldState {
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
            elapsed: 0.0,
            lives: 3,
            max_lives: 3,
        }
    }

    fn hazard(kind: HazardKind) -> Hazard {
        Hazard {
            x: 0.0,
            y: 0.0,
            radius: 12.0,
            dir_x: 1.0,
            dir_y: 0.0,
            speed: 100.0,
            kind,
            age: 0.0,
            life: 10.0,
            turn_rate: 1.5,
            zigzag_amplitude: 20.0,
            zigzag_frequency: 3.0,
        }
    }

    #[test]
    fn zero_dt_returns_current_position_for_every_kind() {
        let world = test_world();
        for kind in [
            HazardKind::Normal,
            HazardKind::Sprinter,
            HazardKind::Heavy,
            HazardKind::Zigzag,
            HazardKind::Tracker,
        ] {
            let h = hazard(kind);
            let (x, y) = predict_position(&h, &world, 0.0);
            assert!((x - h.x).abs() < 1e-9, "{kind:?} moved in x at dt=0");
            assert!((y - h.y).abs() < 1e-9, "{kind:?} moved in y at dt=0");
        }
    }

    #[test]
    fn normal_hazard_moves_linearly() {
        let world = test_world();
        let h = hazard(HazardKind::Normal);
        let (x, y) = predict_position(&h, &world, 1.0);
        assert!((x - 100.0).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn tracker_with_zero_turn_rate_never_changes_heading() {
        let world = test_world();
        let mut h = hazard(HazardKind::Tracker);
        h.turn_rate = 0.0;
        // Player is up and to the right; the tracker must ignore it.
        let (x, y) = predict_position(&h, &world, 2.0);
        assert!((x - 200.0).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn tracker_turns_toward_player_within_turn_budget() {
        let mut world = test_world();
        world.player.x = 0.0;
        world.player.y = 300.0; // directly below the hazard
        let h = hazard(HazardKind::Tracker);
        let (dx, dy) = turned_tracker_direction(&h, world.player.x, world.player.y, 0.5);
        // Heading rotated from +x toward +y but not all the way (budget is
        // 0.75 rad, needed is pi/2).
        assert!(dx > 0.0 && dx < 1.0);
        assert!(dy > 0.0);
        let mag = (dx * dx + dy * dy).sqrt();
        assert!((mag - 1.0).abs() < 1e-9);
    }

    #[test]
    fn aged_zigzag_stays_put_at_zero_dt() {
        let world = test_world();
        let mut h = hazard(HazardKind::Zigzag);
        h.x = 100.0;
        h.y = 100.0;
        h.age = 1.4; // mid-swing
        let (x, y) = predict_position(&h, &world, 0.0);
        assert!((x - 100.0).abs() < 1e-9);
        assert!((y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn aged_zigzag_advances_by_the_phase_delta() {
        let world = test_world();
        let mut h = hazard(HazardKind::Zigzag);
        h.age = 1.4;
        let (x, y) = predict_position(&h, &world, 0.25);
        assert!((x - 25.0).abs() < 1e-9);
        let expected = ((1.65f64 * 3.0).sin() - (1.4f64 * 3.0).sin()) * 20.0;
        assert!((y - expected).abs() < 1e-9);
    }

    #[test]
    fn zigzag_offsets_perpendicular_to_travel() {
        let world = test_world();
        let h = hazard(HazardKind::Zigzag);
        let (x, y) = predict_position(&h, &world, 0.25);
        assert!((x - 25.0).abs() < 1e-9);
        let expected = (0.25f64 * 3.0).sin() * 20.0;
        assert!((y - expected).abs() < 1e-9);
    }

    #[test]
    fn head_on_collision_time_is_exact() {
        // 100 units apart, closing at 50 u/s, combined radius 20: contact
        // after covering 80 units.
        let t = time_to_collision(100.0, 0.0, -50.0, 0.0, 20.0).unwrap();
        assert!((t - 1.6).abs() < 1e-9);
    }

    #[test]
    fn receding_paths_never_collide() {
        assert!(time_to_collision(100.0, 0.0, 50.0, 0.0, 20.0).is_none());
        assert!(time_to_collision(100.0, 0.0, 0.0, 0.0, 20.0).is_none());
    }

    #[test]
    fn overlap_collides_immediately() {
        assert_eq!(time_to_collision(5.0, 0.0, 0.0, 0.0, 20.0), Some(0.0));
    }

    #[test]
    fn predictor_is_deterministic() {
        let world = test_world();
        let h = hazard(HazardKind::Tracker);
        let a = predict_position(&h, &world, 1.3);
        let b = predict_position(&h, &world, 1.3);
        assert_eq!(a, b);
    }
}
