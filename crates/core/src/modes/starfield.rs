//! Layered starfield with diffraction spikes over a drifting nebula.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{clamp_or, FrameInput};
use crate::render::Rgba;

/// Stars closer than this are recycled to the back.
const NEAR_PLANE: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarfieldConfig {
    pub layers: usize,
    pub stars_per_layer: usize,
    /// Travel in depth units per second in silence.
    pub base_speed: f32,
    /// Extra travel per second at full energy.
    pub energy_speed: f32,
    pub focal_length: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub spike_length: f32,
    /// Extra spike length at full high-band energy.
    pub spike_energy: f32,
    pub spike_intensity: f32,
    pub nebula: bool,
    pub nebula_resolution: usize,
    pub nebula_octaves: u32,
    pub nebula_drift: f32,
    /// Hue cycles per second.
    pub nebula_hue_speed: f32,
    pub nebula_alpha: f32,
    pub seed: u32,
    pub star_colour: Rgba,
}

impl Default for StarfieldConfig {
    fn default() -> Self {
        Self {
            layers: 3,
            stars_per_layer: 80,
            base_speed: 0.15,
            energy_speed: 0.6,
            focal_length: 0.6,
            min_size: 0.5,
            max_size: 4.0,
            spike_length: 0.03,
            spike_energy: 0.08,
            spike_intensity: 0.6,
            nebula: true,
            nebula_resolution: 16,
            nebula_octaves: 4,
            nebula_drift: 0.02,
            nebula_hue_speed: 0.03,
            nebula_alpha: 0.35,
            seed: 1337,
            star_colour: Rgba::rgb(0.95, 0.95, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StarSprite {
    pub layer: u32,
    pub position: Vec2,
    /// Normalised depth in `(0, 1]`; smaller is closer.
    pub depth: f32,
    pub size: f32,
    pub brightness: f32,
    /// Length of each of the four spikes.
    pub spike_length: f32,
    pub spike_intensity: f32,
    pub colour: Rgba,
}

/// Row-major grid of nebula colours covering the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NebulaField {
    pub resolution: u32,
    pub cells: Vec<Rgba>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarfieldFrame {
    pub stars: Vec<StarSprite>,
    pub nebula: Option<NebulaField>,
    pub travel: f64,
}

impl StarfieldFrame {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        for star in &mut self.stars {
            f(&mut star.colour);
        }
        if let Some(nebula) = self.nebula.as_mut() {
            nebula.cells.iter_mut().for_each(|cell| f(cell));
        }
    }

    pub fn is_finite(&self) -> bool {
        self.travel.is_finite()
            && self.stars.iter().all(|s| {
                s.position.is_finite()
                    && s.depth.is_finite()
                    && s.size.is_finite()
                    && s.brightness.is_finite()
                    && s.spike_length.is_finite()
                    && s.spike_intensity.is_finite()
                    && s.colour.is_finite()
            })
            && self
                .nebula
                .as_ref()
                .map(|n| n.cells.iter().all(Rgba::is_finite))
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StarfieldRuntime {
    /// Accumulated depth travel. Only ever increases.
    travel: f64,
    time: f64,
}

impl StarfieldRuntime {
    pub fn travel(&self) -> f64 {
        self.travel
    }
}

fn hash(seed: u32, a: u32, b: u32) -> u32 {
    let mut h = seed ^ a.wrapping_mul(0x27d4_eb2d) ^ b.wrapping_mul(0x1656_67b1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2c1b_3c6d);
    h ^= h >> 12;
    h = h.wrapping_mul(0x297a_2d39);
    h ^= h >> 15;
    h
}

fn hash_unit(seed: u32, a: u32, b: u32) -> f32 {
    (hash(seed, a, b) >> 8) as f32 / (1u32 << 24) as f32
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Smoothly interpolated lattice noise in `[0, 1)`.
fn value_noise(seed: u32, p: Vec2) -> f32 {
    let cell = p.floor();
    let frac = p - cell;
    let (ix, iy) = (cell.x as i32 as u32, cell.y as i32 as u32);

    let corner = |dx: u32, dy: u32| hash_unit(seed, ix.wrapping_add(dx), iy.wrapping_add(dy));
    let (tx, ty) = (smoothstep(frac.x), smoothstep(frac.y));
    let top = corner(0, 0) + (corner(1, 0) - corner(0, 0)) * tx;
    let bottom = corner(0, 1) + (corner(1, 1) - corner(0, 1)) * tx;
    top + (bottom - top) * ty
}

/// Multi-octave value noise, normalised to `[0, 1)`.
pub fn fbm(seed: u32, p: Vec2, octaves: u32) -> f32 {
    let mut sum = 0.0;
    let mut norm = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    for octave in 0..octaves.max(1) {
        sum += amplitude * value_noise(seed.wrapping_add(octave), p * frequency);
        norm += amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
    }
    sum / norm
}

fn nebula_field(config: &StarfieldConfig, time: f64, overall: f32) -> NebulaField {
    let resolution = config.nebula_resolution.clamp(4, 64);
    let octaves = config.nebula_octaves.clamp(1, 6);
    let drift = clamp_or(config.nebula_drift, 0.0, 0.5, 0.02);
    let hue_speed = clamp_or(config.nebula_hue_speed, 0.0, 1.0, 0.03);
    let alpha = clamp_or(config.nebula_alpha, 0.0, 1.0, 0.35);

    // Wrapped so long sessions keep f32 precision.
    let offset = ((time * drift as f64) % 1024.0) as f32;
    let hue_base = ((time * hue_speed as f64) % 1.0) as f32;
    let seed = config.seed.wrapping_mul(31);

    let cells = (0..resolution * resolution)
        .map(|i| {
            let cell = Vec2::new((i % resolution) as f32, (i / resolution) as f32) / resolution as f32;
            let p = cell * 3.0 + Vec2::new(offset, offset * 0.37);
            let n = fbm(seed, p, octaves);
            let value = (0.15 + 0.35 * n) * (0.6 + 0.4 * overall);
            Rgba::from_hsv(hue_base + 0.3 * n, 0.6, value, alpha * n)
        })
        .collect();

    NebulaField {
        resolution: resolution as u32,
        cells,
    }
}

pub fn render(input: &FrameInput<'_>, config: &StarfieldConfig, runtime: &mut StarfieldRuntime) -> StarfieldFrame {
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);
    let energies = input.energies();

    let speed = clamp_or(config.base_speed, 0.0, 4.0, 0.15) + clamp_or(config.energy_speed, 0.0, 4.0, 0.6) * energies.overall;
    runtime.travel += (speed * dt) as f64;
    runtime.time += dt as f64;

    let layers = config.layers.clamp(1, 6);
    let per_layer = config.stars_per_layer.clamp(4, 400);
    let focal = clamp_or(config.focal_length, 0.1, 4.0, 0.6);
    let min_size = clamp_or(config.min_size, 0.1, 16.0, 0.5);
    let max_size = clamp_or(config.max_size, min_size, 32.0, 4.0);
    let spike_length = clamp_or(config.spike_length, 0.0, 0.5, 0.03)
        + clamp_or(config.spike_energy, 0.0, 0.5, 0.08) * energies.high;
    let spike_intensity = clamp_or(config.spike_intensity, 0.0, 1.0, 0.6) * (0.5 + 0.5 * input.heartbeat());

    let mut stars = Vec::with_capacity(layers * per_layer);
    for layer in 0..layers {
        // Farther layers move slower.
        let layer_travel = runtime.travel / (1.0 + layer as f64 * 0.6);
        for i in 0..per_layer {
            let key = (layer * per_layer + i) as u32;
            let spread = Vec2::new(
                hash_unit(config.seed, key, 0) * 2.0 - 1.0,
                hash_unit(config.seed, key, 1) * 2.0 - 1.0,
            );
            let z0 = hash_unit(config.seed, key, 2) as f64;
            let depth = (1.0 - (z0 + layer_travel).rem_euclid(1.0)) as f32;
            let depth = depth.max(NEAR_PLANE);

            let position = Vec2::splat(0.5) + spread * (focal / depth) * 0.5;
            if (position - Vec2::splat(0.5)).abs().max_element() > 0.6 {
                continue;
            }

            let near = 1.0 - depth;
            let brightness = near.powf(1.5);
            stars.push(StarSprite {
                layer: layer as u32,
                position,
                depth,
                size: min_size + (max_size - min_size) * near,
                brightness,
                spike_length: spike_length * near,
                spike_intensity,
                colour: config.star_colour.with_alpha(config.star_colour.a * brightness),
            });
        }
    }

    let nebula = config
        .nebula
        .then(|| nebula_field(config, runtime.time, energies.overall));

    StarfieldFrame {
        stars,
        nebula,
        travel: runtime.travel,
    }
}
