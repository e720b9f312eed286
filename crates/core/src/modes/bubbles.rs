//! Bubble field: soft particles that spawn, drift upward and pop.

use std::f32::consts::TAU;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{clamp_or, FrameInput};
use crate::{history::RingBuffer, render::Rgba};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleConfig {
    pub max_bubbles: usize,
    /// Spawns per second in silence.
    pub spawn_rate: f32,
    /// Extra spawns per second at full energy.
    pub spawn_energy_boost: f32,
    pub min_radius: f32,
    pub max_radius: f32,
    /// Upward drift, field heights per second.
    pub rise_speed: f32,
    /// Horizontal sway amplitude, field widths per second.
    pub sway: f32,
    pub lifetime_secs: f32,
    /// Pops per bubble per second at full heartbeat.
    pub beat_pop_rate: f32,
    pub pop_flash_secs: f32,
    /// Position history kept per bubble.
    pub trail_length: usize,
    pub trail_alpha: f32,
    pub trail_stretch: f32,
    pub seed: u64,
    pub colour: Rgba,
    pub flash_colour: Rgba,
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            max_bubbles: 48,
            spawn_rate: 6.0,
            spawn_energy_boost: 20.0,
            min_radius: 0.015,
            max_radius: 0.06,
            rise_speed: 0.08,
            sway: 0.03,
            lifetime_secs: 4.0,
            beat_pop_rate: 1.5,
            pop_flash_secs: 0.15,
            trail_length: 5,
            trail_alpha: 0.5,
            trail_stretch: 1.0,
            seed: 0x5eed_b0b5,
            colour: Rgba::new(0.55, 0.85, 1.0, 0.8),
            flash_colour: Rgba::WHITE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailSample {
    pub position: Vec2,
    pub alpha: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleSprite {
    pub id: u64,
    pub position: Vec2,
    pub radius: f32,
    pub velocity: Vec2,
    /// Length of the motion smear behind the bubble.
    pub smear: f32,
    /// Newest first.
    pub trail: Vec<TrailSample>,
    /// Pop flash progress in `[0, 1]`, zero for a steady bubble.
    pub flash: f32,
    pub colour: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleFrame {
    pub bubbles: Vec<BubbleSprite>,
    pub spawned_total: u64,
    pub popped_total: u64,
}

impl BubbleFrame {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        for bubble in &mut self.bubbles {
            f(&mut bubble.colour);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.bubbles.iter().all(|b| {
            b.position.is_finite()
                && b.radius.is_finite()
                && b.velocity.is_finite()
                && b.smear.is_finite()
                && b.flash.is_finite()
                && b.colour.is_finite()
                && b.trail.iter().all(|t| t.position.is_finite() && t.alpha.is_finite())
        })
    }
}

#[derive(Debug, Clone)]
struct Bubble {
    id: u64,
    position: Vec2,
    velocity: Vec2,
    radius: f32,
    age: f32,
    lifetime: f32,
    sway_phase: f32,
    history: RingBuffer<Vec2>,
    /// Seconds since popping, if popped.
    popped: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct BubbleRuntime {
    rng: fastrand::Rng,
    bubbles: Vec<Bubble>,
    spawn_budget: f32,
    next_id: u64,
    popped_total: u64,
}

impl BubbleRuntime {
    pub fn new(config: &BubbleConfig) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(config.seed),
            bubbles: Vec::new(),
            spawn_budget: 0.0,
            next_id: 0,
            popped_total: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.bubbles.iter().filter(|b| b.popped.is_none()).count()
    }

    fn spawn(&mut self, config: &BubbleConfig, bass: f32) {
        let min = clamp_or(config.min_radius, 0.002, 0.2, 0.015);
        let max = clamp_or(config.max_radius, min, 0.3, 0.06);
        let lifetime = clamp_or(config.lifetime_secs, 0.5, 20.0, 4.0);
        let radius = (min + self.rng.f32() * (max - min)) * (1.0 + 0.5 * bass);

        self.bubbles.push(Bubble {
            id: self.next_id,
            position: Vec2::new(self.rng.f32(), -radius),
            velocity: Vec2::ZERO,
            radius,
            age: 0.0,
            lifetime: lifetime * (0.6 + 0.8 * self.rng.f32()),
            sway_phase: self.rng.f32() * TAU,
            history: RingBuffer::with_capacity(config.trail_length.clamp(2, 12)),
            popped: None,
        });
        self.next_id += 1;
    }
}

pub fn render(input: &FrameInput<'_>, config: &BubbleConfig, runtime: &mut BubbleRuntime) -> BubbleFrame {
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);
    let energies = input.energies();
    let heartbeat = input.heartbeat();
    let max_bubbles = config.max_bubbles.clamp(1, 256);
    let flash_secs = clamp_or(config.pop_flash_secs, 0.02, 1.0, 0.15);
    let rise = clamp_or(config.rise_speed, 0.0, 1.0, 0.08);
    let sway = clamp_or(config.sway, 0.0, 0.5, 0.03);
    let pop_rate = clamp_or(config.beat_pop_rate, 0.0, 20.0, 1.5);

    let rate = clamp_or(config.spawn_rate, 0.0, 60.0, 6.0)
        + clamp_or(config.spawn_energy_boost, 0.0, 120.0, 20.0) * energies.overall;
    runtime.spawn_budget = (runtime.spawn_budget + rate * dt).min(max_bubbles as f32);
    while runtime.spawn_budget >= 1.0 && runtime.live_count() < max_bubbles {
        runtime.spawn_budget -= 1.0;
        runtime.spawn(config, energies.bass);
    }

    for bubble in &mut runtime.bubbles {
        if let Some(since) = bubble.popped.as_mut() {
            *since += dt;
            continue;
        }
        bubble.age += dt;
        bubble.history.push(bubble.position);
        bubble.velocity = Vec2::new(
            sway * (bubble.sway_phase + bubble.age * 1.7).cos(),
            rise * (1.0 + energies.bass),
        );
        bubble.position += bubble.velocity * dt;

        let beat_pop = runtime.rng.f32() < heartbeat * pop_rate * dt;
        if bubble.age > bubble.lifetime || bubble.position.y > 1.0 + bubble.radius || beat_pop {
            bubble.popped = Some(0.0);
            runtime.popped_total += 1;
        }
    }
    runtime
        .bubbles
        .retain(|b| b.popped.map_or(true, |since| since <= flash_secs));

    let trail_alpha = clamp_or(config.trail_alpha, 0.0, 1.0, 0.5);
    let trail_stretch = clamp_or(config.trail_stretch, 0.0, 4.0, 1.0);
    let bubbles = runtime
        .bubbles
        .iter()
        .map(|b| {
            let samples = b.history.len();
            let trail = b
                .history
                .iter_newest_first()
                .enumerate()
                .map(|(k, position)| TrailSample {
                    position: *position,
                    alpha: trail_alpha * (1.0 - (k + 1) as f32 / (samples + 1) as f32),
                })
                .collect();

            let (flash, radius, colour) = match b.popped {
                Some(since) => {
                    let t = (since / flash_secs).clamp(0.0, 1.0);
                    let colour = config.flash_colour.with_alpha(config.flash_colour.a * (1.0 - t));
                    (t.max(f32::EPSILON), b.radius * (1.0 + 0.5 * t), colour)
                }
                None => (0.0, b.radius, config.colour.clamped()),
            };

            BubbleSprite {
                id: b.id,
                position: b.position,
                radius,
                velocity: b.velocity,
                smear: b.velocity.length() * trail_stretch,
                trail,
                flash,
                colour,
            }
        })
        .collect();

    BubbleFrame {
        bubbles,
        spawned_total: runtime.next_id,
        popped_total: runtime.popped_total,
    }
}
