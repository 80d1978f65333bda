//! Headless episode harness.
//!
//! Drives the agent against a minimal seeded spawner so the engine can be
//! exercised, benchmarked, and trained end to end without the real game
//! loop. This is scaffolding around the decision core, not the external
//! spawn scheduler: cadence and kind mix here are deliberately simple.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::agent::AutopilotAgent;
use crate::predict::{predict_position, turned_tracker_direction};
use crate::world::{
    distance, normalize, DecisionBranch, Hazard, HazardKind, Pickup, PickupKind, Player,
    WorldState,
};

/// Simulation step, nominal 60 fps.
pub const TICK_SECONDS: f64 = 1.0 / 60.0;

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub max_ticks: u32,
    pub difficulty: f64,
    /// Feed experiences to the replay buffer while running.
    pub training: bool,
    pub width: f64,
    pub height: f64,
    pub starting_lives: u32,
    /// Seconds between hazard spawns at difficulty 0.
    pub spawn_interval: f64,
    pub max_hazards: usize,
    pub pickup_interval: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_ticks: 3600,
            difficulty: 0.5,
            training: false,
            width: 800.0,
            height: 600.0,
            starting_lives: 3,
            spawn_interval: 1.6,
            max_hazards: 14,
            pickup_interval: 5.0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BranchCounts {
    pub emergency: u32,
    pub high_risk: u32,
    pub pickup_pursuit: u32,
    pub policy_guided: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct EpisodeMetrics {
    pub seed: u64,
    pub ticks: u32,
    pub survival_seconds: f64,
    pub score: f64,
    pub pickups_taken: u32,
    pub lives_lost: u32,
    pub final_lives: u32,
    pub branch_counts: BranchCounts,
}

/// Run one seeded episode to completion (death or tick budget).
pub fn run_episode(agent: &mut AutopilotAgent, cfg: &HarnessConfig, seed: u64) -> EpisodeMetrics {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut world = WorldState {
        width: cfg.width,
        height: cfg.height,
        player: Player {
            x: cfg.width / 2.0,
            y: cfg.height / 2.0,
            radius: 15.0,
            base_speed: 3.0,
            vx: 0.0,
            vy: 0.0,
        },
        hazards: Vec::new(),
        pickups: Vec::new(),
        elapsed: 0.0,
        lives: cfg.starting_lives,
        max_lives: cfg.starting_lives,
    };

    let mut metrics = EpisodeMetrics {
        seed,
        ticks: 0,
        survival_seconds: 0.0,
        score: 0.0,
        pickups_taken: 0,
        lives_lost: 0,
        final_lives: cfg.starting_lives,
        branch_counts: BranchCounts::default(),
    };

    let spawn_interval = (cfg.spawn_interval * (1.0 - cfg.difficulty * 0.5)).max(0.4);
    let mut next_spawn = 0.5;
    let mut next_pickup = cfg.pickup_interval;

    for _ in 0..cfg.max_ticks {
        let decision = agent.decide(&world, cfg.difficulty, cfg.training);
        match decision.branch {
            DecisionBranch::Emergency => metrics.branch_counts.emergency += 1,
            DecisionBranch::HighRisk => metrics.branch_counts.high_risk += 1,
            DecisionBranch::PickupPursuit(_) => metrics.branch_counts.pickup_pursuit += 1,
            DecisionBranch::PolicyGuided => metrics.branch_counts.policy_guided += 1,
        }

        // Apply the decision.
        let (dx, dy) = decision.vector;
        let step = world.player.base_speed * decision.speed;
        world.player.vx = dx * step;
        world.player.vy = dy * step;
        world.player.x = (world.player.x + world.player.vx)
            .clamp(world.player.radius, world.width - world.player.radius);
        world.player.y = (world.player.y + world.player.vy)
            .clamp(world.player.radius, world.height - world.player.radius);

        advance_hazards(&mut world);
        world.elapsed += TICK_SECONDS;
        metrics.ticks += 1;

        if world.elapsed >= next_spawn && world.hazards.len() < cfg.max_hazards {
            world.hazards.push(spawn_hazard(&world, cfg, &mut rng));
            next_spawn = world.elapsed + spawn_interval;
        }
        if world.elapsed >= next_pickup {
            world.pickups.push(spawn_pickup(&world, &mut rng));
            next_pickup = world.elapsed + cfg.pickup_interval;
        }

        let mut reward = TICK_SECONDS;
        let mut terminal = false;

        // Pickup collection.
        let p = world.player.clone();
        let mut collected = Vec::new();
        for (idx, pickup) in world.pickups.iter().enumerate() {
            if distance(p.x, p.y, pickup.x, pickup.y) < p.radius + pickup.radius {
                collected.push(idx);
            }
        }
        for idx in collected.into_iter().rev() {
            let pickup = world.pickups.remove(idx);
            metrics.pickups_taken += 1;
            metrics.score += 5.0;
            reward += 5.0;
            if pickup.kind == PickupKind::Heart && world.lives < world.max_lives {
                world.lives += 1;
            }
        }
        world.pickups.retain(|pickup| pickup.life > 0.0);

        // Hazard contact.
        let mut hit = None;
        for (idx, hazard) in world.hazards.iter().enumerate() {
            if distance(p.x, p.y, hazard.x, hazard.y) < p.radius + hazard.radius {
                hit = Some(idx);
                break;
            }
        }
        if let Some(idx) = hit {
            world.hazards.remove(idx);
            metrics.lives_lost += 1;
            reward -= 10.0;
            world.lives = world.lives.saturating_sub(1);
            if world.lives == 0 {
                terminal = true;
            }
        }

        if cfg.training {
            let next = if terminal {
                None
            } else {
                Some((&world, cfg.difficulty))
            };
            agent.observe(reward, next, terminal);
        }

        if terminal {
            break;
        }
    }

    metrics.survival_seconds = world.elapsed;
    metrics.score += world.elapsed;
    metrics.final_lives = world.lives;
    metrics
}

fn advance_hazards(world: &mut WorldState) {
    let snapshot = world.clone();
    for hazard in &mut world.hazards {
        let (nx, ny) = predict_position(hazard, &snapshot, TICK_SECONDS);
        if hazard.kind == HazardKind::Tracker {
            let (dx, dy) = turned_tracker_direction(
                hazard,
                snapshot.player.x,
                snapshot.player.y,
                TICK_SECONDS,
            );
            hazard.dir_x = dx;
            hazard.dir_y = dy;
        }
        hazard.x = nx;
        hazard.y = ny;
        hazard.age += TICK_SECONDS;
        hazard.life -= TICK_SECONDS;
    }
    let margin = 80.0;
    world.hazards.retain(|hazard| {
        hazard.life > 0.0
            && hazard.x > -margin
            && hazard.x < world.width + margin
            && hazard.y > -margin
            && hazard.y < world.height + margin
    });
    for pickup in &mut world.pickups {
        pickup.life -= TICK_SECONDS;
    }
}

fn spawn_hazard(world: &WorldState, cfg: &HarnessConfig, rng: &mut SmallRng) -> Hazard {
    // Random edge entry aimed at a jittered interior point.
    let (x, y) = match rng.gen_range(0..4) {
        0 => (rng.gen_range(0.0..world.width), -20.0),
        1 => (rng.gen_range(0.0..world.width), world.height + 20.0),
        2 => (-20.0, rng.gen_range(0.0..world.height)),
        _ => (world.width + 20.0, rng.gen_range(0.0..world.height)),
    };
    let target_x = world.width * rng.gen_range(0.25..0.75);
    let target_y = world.height * rng.gen_range(0.25..0.75);
    let (dir_x, dir_y) = normalize(target_x - x, target_y - y);

    let roll: f64 = rng.gen();
    let kind = if roll < 0.45 {
        HazardKind::Normal
    } else if roll < 0.6 {
        HazardKind::Sprinter
    } else if roll < 0.75 {
        HazardKind::Heavy
    } else if roll < 0.9 {
        HazardKind::Zigzag
    } else {
        HazardKind::Tracker
    };

    let difficulty_boost = 1.0 + cfg.difficulty * 0.6;
    let (radius, speed) = match kind {
        HazardKind::Sprinter => (10.0, 170.0 * difficulty_boost),
        HazardKind::Heavy => (24.0, 55.0 * difficulty_boost),
        HazardKind::Tracker => (12.0, 95.0 * difficulty_boost),
        _ => (14.0, 100.0 * difficulty_boost),
    };

    Hazard {
        x,
        y,
        radius,
        dir_x,
        dir_y,
        speed,
        kind,
        age: 0.0,
        life: rng.gen_range(8.0..16.0),
        turn_rate: if kind == HazardKind::Tracker {
            rng.gen_range(0.8..2.0)
        } else {
            0.0
        },
        zigzag_amplitude: if kind == HazardKind::Zigzag {
            rng.gen_range(12.0..30.0)
        } else {
            0.0
        },
        zigzag_frequency: if kind == HazardKind::Zigzag {
            rng.gen_range(1.5..4.0)
        } else {
            0.0
        },
    }
}

fn spawn_pickup(world: &WorldState, rng: &mut SmallRng) -> Pickup {
    let roll: f64 = rng.gen();
    let kind = if roll < 0.25 {
        PickupKind::Heart
    } else if roll < 0.45 {
        PickupKind::Shield
    } else if roll < 0.6 {
        PickupKind::Speed
    } else if roll < 0.85 {
        PickupKind::Points
    } else {
        PickupKind::Power
    };
    Pickup {
        x: rng.gen_range(60.0..world.width - 60.0),
        y: rng.gen_range(60.0..world.height - 60.0),
        radius: 10.0,
        life: 8.0,
        max_life: 8.0,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_episode_completes_with_sane_metrics() {
        let mut agent = AutopilotAgent::new(42);
        let cfg = HarnessConfig {
            max_ticks: 30,
            ..HarnessConfig::default()
        };
        let metrics = run_episode(&mut agent, &cfg, 7);
        assert!(metrics.ticks > 0 && metrics.ticks <= 30);
        assert!(metrics.survival_seconds > 0.0);
        assert_eq!(
            metrics.branch_counts.emergency
                + metrics.branch_counts.high_risk
                + metrics.branch_counts.pickup_pursuit
                + metrics.branch_counts.policy_guided,
            metrics.ticks
        );
    }

    #[test]
    fn training_episode_fills_replay_buffer() {
        let mut agent = AutopilotAgent::new(42);
        let cfg = HarnessConfig {
            max_ticks: 20,
            training: true,
            ..HarnessConfig::default()
        };
        run_episode(&mut agent, &cfg, 7);
        assert!(agent.buffer_len() > 0);
    }

    #[test]
    fn same_seed_spawns_identical_hazards() {
        let cfg = HarnessConfig::default();
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
            lives: 3,
            max_lives: 3,
        };
        let a = spawn_hazard(&world, &cfg, &mut SmallRng::seed_from_u64(5));
        let b = spawn_hazard(&world, &cfg, &mut SmallRng::seed_from_u64(5));
        assert_eq!(a.x, b.x);
        assert_eq!(a.speed, b.speed);
        assert_eq!(a.kind, b.kind);
    }
}
