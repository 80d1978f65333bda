//! Feature extraction: world state to the fixed 200-value network input.
//!
//! The vector is rebuilt from scratch every tick. Each block is clamped or
//! zero-padded to its declared width, so the total length is always exactly
//! [`FEATURE_COUNT`] no matter how crowded or empty the field is. That is a
//! deliberate invariant, not an error path.

use crate::predict::{effective_velocity, predict_position, time_to_collision};
use crate::threat::{self, hazard_threat};
use crate::world::{distance, normalize, HazardKind, WorldState};

/// Total feature vector length.
pub const FEATURE_COUNT: usize = 200;

/// Prediction horizons (seconds) for the threat scan block.
pub const SCAN_HORIZONS: [f64; 4] = [0.5, 1.0, 2.0, 3.0];

/// Hazards encoded in the per-hazard block, nearest first.
pub const MAX_TRACKED_HAZARDS: usize = 20;
/// Values per tracked hazard.
pub const HAZARD_WIDTH: usize = 6;
/// Pickups encoded, highest urgency first.
pub const MAX_TRACKED_PICKUPS: usize = 5;
/// Values per tracked pickup.
pub const PICKUP_WIDTH: usize = 4;

const BASE_WIDTH: usize = 8;
const SCAN_WIDTH: usize = 12;
const CENTER_WIDTH: usize = 10;
const GLOBAL_WIDTH: usize = 15;
const SAFETY_WIDTH: usize = 15;

/// Offset of the per-hazard block, used by replay priority to read hazard
/// proximity back out of a stored state vector.
pub const HAZARD_BLOCK_OFFSET: usize = BASE_WIDTH + SCAN_WIDTH + CENTER_WIDTH;

/// Build the 200-element feature vector for one tick.
pub fn extract(world: &WorldState, difficulty: f64) -> Vec<f64> {
    let mut features = Vec::with_capacity(FEATURE_COUNT);

    push_block(&mut features, base_features(world, difficulty), BASE_WIDTH);
    push_block(&mut features, horizon_scan(world), SCAN_WIDTH);
    push_block(&mut features, center_features(world), CENTER_WIDTH);
    push_block(
        &mut features,
        hazard_block(world),
        MAX_TRACKED_HAZARDS * HAZARD_WIDTH,
    );
    push_block(
        &mut features,
        pickup_block(world),
        MAX_TRACKED_PICKUPS * PICKUP_WIDTH,
    );
    push_block(&mut features, global_threat(world), GLOBAL_WIDTH);
    push_block(&mut features, safety_block(world), SAFETY_WIDTH);

    debug_assert_eq!(features.len(), FEATURE_COUNT);
    features.truncate(FEATURE_COUNT);
    features.resize(FEATURE_COUNT, 0.0);
    for value in &mut features {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    features
}

/// Append `block` clamped/padded to exactly `width` values.
fn push_block(out: &mut Vec<f64>, mut block: Vec<f64>, width: usize) {
    block.truncate(width);
    block.resize(width, 0.0);
    out.extend(block);
}

fn base_features(world: &WorldState, difficulty: f64) -> Vec<f64> {
    let p = &world.player;
    let speed = (p.vx * p.vx + p.vy * p.vy).sqrt();
    vec![
        p.x / world.width.max(1.0),
        p.y / world.height.max(1.0),
        (speed / 10.0).min(1.0),
        (p.vx / 10.0).clamp(-1.0, 1.0),
        (p.vy / 10.0).clamp(-1.0, 1.0),
        difficulty.clamp(0.0, 1.0),
        (world.elapsed / 120.0).min(1.0),
        world.life_ratio(),
    ]
}

/// Four-horizon predictive scan: per horizon, aggregate threat intensity,
/// fraction of hazards inside the critical predicted distance, and how much
/// the predicted threat mass pushes the player toward the field center.
fn horizon_scan(world: &WorldState) -> Vec<f64> {
    let p = &world.player;
    let (cx, cy) = world.center();
    let (to_center_x, to_center_y) = normalize(cx - p.x, cy - p.y);
    let mut out = Vec::with_capacity(SCAN_WIDTH);

    for horizon in SCAN_HORIZONS {
        let critical = p.radius + 80.0;
        let mut intensity = 0.0;
        let mut critical_count = 0usize;
        let mut push_x = 0.0;
        let mut push_y = 0.0;

        for hazard in &world.hazards {
            let (hx, hy) = predict_position(hazard, world, horizon);
            let dist = distance(p.x, p.y, hx, hy);
            let contact = p.radius + hazard.radius;
            if dist < critical {
                critical_count += 1;
            }
            let weight = (-(dist - contact).max(0.0) / 100.0).exp();
            intensity += weight;
            // Threat behind the player pushes it toward the center.
            let (ax, ay) = normalize(p.x - hx, p.y - hy);
            push_x += ax * weight;
            push_y += ay * weight;
        }

        let count = world.hazards.len().max(1) as f64;
        let (push_nx, push_ny) = normalize(push_x, push_y);
        out.push((intensity / count).min(1.0));
        out.push(critical_count as f64 / count);
        out.push(push_nx * to_center_x + push_ny * to_center_y);
    }
    out
}

fn center_features(world: &WorldState) -> Vec<f64> {
    let p = &world.player;
    let (cx, cy) = world.center();
    let center_dist = distance(p.x, p.y, cx, cy);
    let max_dist = distance(0.0, 0.0, cx, cy).max(1.0);
    let (to_center_x, to_center_y) = normalize(cx - p.x, cy - p.y);
    let pressure = threat::edge_pressure(world);

    // Comfort: 1 at the center, fading to 0 at 40% of the field.
    let comfort = (1.0 - center_dist / (0.4 * world.width.min(world.height))).clamp(0.0, 1.0);

    // How safe the center region itself currently is.
    let mut center_safety = 1.0f64;
    for hazard in &world.hazards {
        let hazard_center_dist = distance(hazard.x, hazard.y, cx, cy);
        if hazard_center_dist < 150.0 {
            center_safety *= (hazard_center_dist / 150.0).max(0.2);
        }
    }

    vec![
        center_dist / max_dist,
        to_center_x * (center_dist / max_dist),
        to_center_y * (center_dist / max_dist),
        comfort,
        pressure.left,
        pressure.right,
        pressure.top,
        pressure.bottom,
        pressure.aggregate(),
        center_safety,
    ]
}

/// Up to 20 hazards, nearest first: normalized position, one-step predicted
/// position, radius, and a distance-based exponential weight.
fn hazard_block(world: &WorldState) -> Vec<f64> {
    let p = &world.player;
    let mut order: Vec<(usize, f64)> = world
        .hazards
        .iter()
        .enumerate()
        .map(|(idx, h)| (idx, distance(p.x, p.y, h.x, h.y)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut out = Vec::with_capacity(MAX_TRACKED_HAZARDS * HAZARD_WIDTH);
    for &(idx, dist) in order.iter().take(MAX_TRACKED_HAZARDS) {
        let hazard = &world.hazards[idx];
        let (px, py) = predict_position(hazard, world, 0.5);
        out.push(hazard.x / world.width.max(1.0));
        out.push(hazard.y / world.height.max(1.0));
        out.push(px / world.width.max(1.0));
        out.push(py / world.height.max(1.0));
        out.push((hazard.radius / 50.0).min(1.0));
        out.push((-dist / 150.0).exp());
    }
    out
}

/// Up to 5 pickups sorted by blended urgency (expiry) and proximity:
/// normalized position, life ratio, and a type indicator.
fn pickup_block(world: &WorldState) -> Vec<f64> {
    let p = &world.player;
    let mut order: Vec<(usize, f64)> = world
        .pickups
        .iter()
        .enumerate()
        .map(|(idx, pickup)| {
            let dist = distance(p.x, p.y, pickup.x, pickup.y);
            let urgency = 1.0 - pickup.life_ratio();
            let proximity = (-dist / 250.0).exp();
            (idx, urgency * 0.5 + proximity * 0.5)
        })
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut out = Vec::with_capacity(MAX_TRACKED_PICKUPS * PICKUP_WIDTH);
    for &(idx, _) in order.iter().take(MAX_TRACKED_PICKUPS) {
        let pickup = &world.pickups[idx];
        out.push(pickup.x / world.width.max(1.0));
        out.push(pickup.y / world.height.max(1.0));
        out.push(pickup.life_ratio());
        out.push(crate::pickups::kind_indicator(pickup.kind));
    }
    out
}

/// Global threat summary: distance spread, local density, directional threat
/// sums, minimum time-to-collision, tracker pressure, cluster spread, and
/// aggregate kinematics.
fn global_threat(world: &WorldState) -> Vec<f64> {
    let p = &world.player;
    if world.hazards.is_empty() {
        return Vec::new();
    }

    let mut near = f64::MAX;
    let mut far = 0.0f64;
    let mut sum = 0.0;
    let mut local = 0usize;
    let mut dir_sums = [0.0f64; 4]; // up, down, left, right
    let mut min_ttc = f64::MAX;
    let mut tracker_threat = 0.0f64;
    let mut speed_sum = 0.0;
    let mut fastest = 0.0f64;
    let mut approaching = 0usize;
    let mut mean_x = 0.0;
    let mut mean_y = 0.0;

    for hazard in &world.hazards {
        let dist = distance(p.x, p.y, hazard.x, hazard.y);
        near = near.min(dist);
        far = far.max(dist);
        sum += dist;
        if dist < 200.0 {
            local += 1;
        }

        let weight = hazard_threat(world, hazard);
        if hazard.y < p.y {
            dir_sums[0] += weight;
        } else {
            dir_sums[1] += weight;
        }
        if hazard.x < p.x {
            dir_sums[2] += weight;
        } else {
            dir_sums[3] += weight;
        }

        let (hvx, hvy) = effective_velocity(hazard, world, 0.25);
        if let Some(ttc) = time_to_collision(
            hazard.x - p.x,
            hazard.y - p.y,
            hvx - p.vx,
            hvy - p.vy,
            p.radius + hazard.radius,
        ) {
            min_ttc = min_ttc.min(ttc);
            approaching += 1;
        }

        if hazard.kind == HazardKind::Tracker {
            tracker_threat += (-dist / 200.0).exp();
        }
        speed_sum += hazard.speed;
        fastest = fastest.max(hazard.speed);
        mean_x += hazard.x;
        mean_y += hazard.y;
    }

    let count = world.hazards.len() as f64;
    mean_x /= count;
    mean_y /= count;
    let spread = world
        .hazards
        .iter()
        .map(|h| distance(h.x, h.y, mean_x, mean_y))
        .sum::<f64>()
        / count;

    let diag = (world.width * world.width + world.height * world.height).sqrt();
    vec![
        near / diag,
        (sum / count) / diag,
        far / diag,
        local as f64 / count,
        dir_sums[0].min(3.0) / 3.0,
        dir_sums[1].min(3.0) / 3.0,
        dir_sums[2].min(3.0) / 3.0,
        dir_sums[3].min(3.0) / 3.0,
        if min_ttc.is_finite() {
            (min_ttc / 5.0).min(1.0)
        } else {
            1.0
        },
        tracker_threat.min(1.0),
        spread / diag,
        (count / MAX_TRACKED_HAZARDS as f64).min(1.0),
        (speed_sum / count / 300.0).min(1.0),
        approaching as f64 / count,
        (fastest / 300.0).min(1.0),
    ]
}

/// Boundary distances, quadrant safety over a 2x2 partition, and the single
/// safest short-range direction.
fn safety_block(world: &WorldState) -> Vec<f64> {
    let p = &world.player;
    let mut out = vec![
        p.x / world.width.max(1.0),
        (world.width - p.x) / world.width.max(1.0),
        p.y / world.height.max(1.0),
        (world.height - p.y) / world.height.max(1.0),
    ];

    // 2x2 grid cell safety: exponential penalty from hazards near each cell
    // center.
    let (cx, cy) = world.center();
    let quarters = [
        (cx / 2.0, cy / 2.0),
        (cx * 1.5, cy / 2.0),
        (cx / 2.0, cy * 1.5),
        (cx * 1.5, cy * 1.5),
    ];
    for (qx, qy) in quarters {
        let mut cell_safety = 1.0f64;
        for hazard in &world.hazards {
            let dist = distance(hazard.x, hazard.y, qx, qy);
            cell_safety *= 1.0 - (-dist / 180.0).exp() * 0.8;
        }
        out.push(cell_safety.clamp(0.0, 1.0));
    }

    // Safest short-range direction by the 8-step walk.
    let mut best = (0.0, 0.0);
    let mut best_score = -1.0;
    for &action in &crate::world::MOVEMENT_ACTIONS {
        let (dx, dy) = crate::world::ACTION_VECTORS[action];
        let score = threat::direction_safety(world, dx, dy);
        if score > best_score {
            best_score = score;
            best = (dx, dy);
        }
    }
    out.push(best.0);
    out.push(best.1);
    out
}
