//! Double helix in a pseudo-3D projection.

use std::f32::consts::{PI, TAU};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{clamp_or, FrameInput};
use crate::render::Rgba;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelixConfig {
    /// Full turns across the width.
    pub turns: f32,
    pub amplitude: f32,
    pub bass_amplitude: f32,
    /// Radians per second in silence.
    pub rotation_speed: f32,
    /// Rotation multiplier added at full bass.
    pub bass_boost: f32,
    pub samples: usize,
    pub rungs: bool,
    pub rung_count: usize,
    pub min_thickness: f32,
    pub max_thickness: f32,
    /// How much the far side dims, in `[0, 1]`.
    pub depth_dimming: f32,
    pub colours: [Rgba; 2],
    pub rung_colour: Rgba,
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            turns: 2.5,
            amplitude: 0.18,
            bass_amplitude: 0.08,
            rotation_speed: 1.2,
            bass_boost: 3.0,
            samples: 128,
            rungs: true,
            rung_count: 16,
            min_thickness: 1.0,
            max_thickness: 4.0,
            depth_dimming: 0.6,
            colours: [Rgba::rgb(0.35, 0.7, 1.0), Rgba::rgb(1.0, 0.45, 0.35)],
            rung_colour: Rgba::new(0.9, 0.9, 0.95, 0.6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrandPoint {
    pub position: Vec2,
    /// Projected depth in `[-1, 1]`; positive is toward the viewer.
    pub depth: f32,
    pub thickness: f32,
    pub brightness: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strand {
    pub points: Vec<StrandPoint>,
    pub colour: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rung {
    pub from: Vec2,
    pub to: Vec2,
    pub colour: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelixFrame {
    pub strands: Vec<Strand>,
    pub rungs: Vec<Rung>,
    pub rotation: f32,
}

impl HelixFrame {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        for strand in &mut self.strands {
            f(&mut strand.colour);
        }
        for rung in &mut self.rungs {
            f(&mut rung.colour);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite()
            && self.strands.iter().all(|s| {
                s.colour.is_finite()
                    && s.points.iter().all(|p| {
                        p.position.is_finite() && p.depth.is_finite() && p.thickness.is_finite() && p.brightness.is_finite()
                    })
            })
            && self
                .rungs
                .iter()
                .all(|r| r.from.is_finite() && r.to.is_finite() && r.colour.is_finite())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HelixRuntime {
    rotation: f32,
}

pub fn render(input: &FrameInput<'_>, config: &HelixConfig, runtime: &mut HelixRuntime) -> HelixFrame {
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);
    let energies = input.energies();

    let speed = clamp_or(config.rotation_speed, 0.0, 10.0, 1.2)
        * (1.0 + clamp_or(config.bass_boost, 0.0, 10.0, 3.0) * energies.bass);
    runtime.rotation = (runtime.rotation + speed * dt).rem_euclid(TAU);

    let turns = clamp_or(config.turns, 0.5, 8.0, 2.5);
    let amplitude = clamp_or(config.amplitude, 0.02, 0.45, 0.18)
        + clamp_or(config.bass_amplitude, 0.0, 0.2, 0.08) * energies.bass;
    let samples = config.samples.clamp(16, 512);
    let min_thickness = clamp_or(config.min_thickness, 0.25, 16.0, 1.0);
    let max_thickness = clamp_or(config.max_thickness, min_thickness, 32.0, 4.0);
    let dimming = clamp_or(config.depth_dimming, 0.0, 1.0, 0.6);
    let rotation = runtime.rotation;

    let point = |x: f32, strand: usize| {
        let theta = TAU * turns * x + rotation + strand as f32 * PI;
        let depth = theta.cos();
        let near = 0.5 * (depth + 1.0);
        StrandPoint {
            position: Vec2::new(x, 0.5 + amplitude * theta.sin()),
            depth,
            thickness: min_thickness + (max_thickness - min_thickness) * near,
            brightness: 1.0 - dimming * (1.0 - near),
        }
    };

    let strands = (0..2)
        .map(|strand| Strand {
            points: (0..samples)
                .map(|s| point(s as f32 / (samples - 1) as f32, strand))
                .collect(),
            colour: config.colours[strand].scaled(0.85 + 0.15 * energies.overall),
        })
        .collect();

    let rungs = if config.rungs {
        let count = config.rung_count.min(64);
        (0..count)
            .map(|i| {
                let x = (i as f32 + 0.5) / count as f32;
                let (a, b) = (point(x, 0), point(x, 1));
                // Rungs facing the viewer edge-on are drawn fainter.
                let facing = (a.position.y - b.position.y).abs() / (2.0 * amplitude);
                Rung {
                    from: a.position,
                    to: b.position,
                    colour: config
                        .rung_colour
                        .with_alpha(config.rung_colour.a * (0.35 + 0.65 * facing)),
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    HelixFrame {
        strands,
        rungs,
        rotation,
    }
}
