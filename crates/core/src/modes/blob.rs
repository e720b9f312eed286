//! Organic blob: a breathing signed-distance shape with harmonic wobble.

use std::f32::consts::TAU;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{clamp_or, curve::points_finite, FrameInput};
use crate::render::Rgba;

/// Exponent of the tendril lobe; higher is narrower.
const STRETCH_SHARPNESS: i32 = 8;
const STRETCH_TURN_PER_SEC: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Harmonic {
    /// Angular frequency, lobes per revolution.
    pub frequency: u32,
    pub weight: f32,
    /// Rotation speed of this harmonic, radians per second.
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub base_radius: f32,
    /// Extra radius at full bass.
    pub bass_breath: f32,
    /// Radius the gate shrinks toward when playback stops.
    pub resting_radius: f32,
    pub harmonics: Vec<Harmonic>,
    pub constant_wobble: f32,
    pub reactive_wobble: f32,
    pub stretch: bool,
    pub stretch_strength: f32,
    /// Time constant of the playback gate.
    pub gate_secs: f32,
    pub outline_points: usize,
    pub colour: Rgba,
    pub glow: Rgba,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            base_radius: 0.25,
            bass_breath: 0.12,
            resting_radius: 0.1,
            harmonics: vec![
                Harmonic {
                    frequency: 3,
                    weight: 0.5,
                    speed: 0.7,
                },
                Harmonic {
                    frequency: 5,
                    weight: 0.3,
                    speed: -1.1,
                },
                Harmonic {
                    frequency: 7,
                    weight: 0.2,
                    speed: 1.6,
                },
            ],
            constant_wobble: 0.025,
            reactive_wobble: 0.08,
            stretch: false,
            stretch_strength: 0.35,
            gate_secs: 0.6,
            outline_points: 96,
            colour: Rgba::rgb(0.95, 0.4, 0.6),
            glow: Rgba::new(1.0, 0.7, 0.85, 0.5),
        }
    }
}

/// One evaluated boundary harmonic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicTerm {
    pub frequency: u32,
    /// Relative radius perturbation.
    pub amplitude: f32,
    pub phase: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stretch {
    pub angle: f32,
    /// Absolute radius added at the tip of the tendril.
    pub length: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobFrame {
    pub center: Vec2,
    pub radius: f32,
    pub harmonics: Vec<HarmonicTerm>,
    pub stretch: Option<Stretch>,
    /// Playback gate in `[0, 1]`; zero is fully at rest.
    pub gate: f32,
    pub outline: Vec<Vec2>,
    pub colour: Rgba,
    pub glow: Rgba,
}

impl BlobFrame {
    /// Boundary distance from the centre along `theta`.
    pub fn radius_at(&self, theta: f32) -> f32 {
        let wobble: f32 = self
            .harmonics
            .iter()
            .map(|h| h.amplitude * (h.frequency as f32 * theta + h.phase).sin())
            .sum();
        let tendril = self
            .stretch
            .map(|s| s.length * (theta - s.angle).cos().max(0.0).powi(STRETCH_SHARPNESS))
            .unwrap_or(0.0);
        self.radius * (1.0 + wobble).max(0.2) + tendril
    }

    /// Signed distance from `point` to the boundary, negative inside. Exact
    /// along rays from the centre; a bound elsewhere.
    pub fn signed_distance(&self, point: Vec2) -> f32 {
        let offset = point - self.center;
        let theta = offset.y.atan2(offset.x);
        offset.length() - self.radius_at(theta)
    }

    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        f(&mut self.colour);
        f(&mut self.glow);
    }

    pub fn is_finite(&self) -> bool {
        self.center.is_finite()
            && self.radius.is_finite()
            && self.gate.is_finite()
            && self
                .harmonics
                .iter()
                .all(|h| h.amplitude.is_finite() && h.phase.is_finite())
            && self
                .stretch
                .map(|s| s.angle.is_finite() && s.length.is_finite())
                .unwrap_or(true)
            && points_finite(&self.outline)
            && self.colour.is_finite()
            && self.glow.is_finite()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlobRuntime {
    time: f32,
    gate: f32,
    stretch_angle: f32,
}

pub fn render(input: &FrameInput<'_>, config: &BlobConfig, runtime: &mut BlobRuntime) -> BlobFrame {
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);
    let energies = input.energies();
    runtime.time += dt;

    let gate_secs = clamp_or(config.gate_secs, 0.01, 5.0, 0.6);
    let target = if input.playing { 1.0 } else { 0.0 };
    runtime.gate += (target - runtime.gate) * (1.0 - (-dt / gate_secs).exp());

    let resting = clamp_or(config.resting_radius, 0.02, 0.3, 0.1);
    let full = clamp_or(config.base_radius, 0.05, 0.45, 0.25) + clamp_or(config.bass_breath, 0.0, 0.3, 0.12) * energies.bass;
    let radius = resting + (full - resting).max(0.0) * runtime.gate;

    let constant = clamp_or(config.constant_wobble, 0.0, 0.2, 0.025);
    let reactive = clamp_or(config.reactive_wobble, 0.0, 0.3, 0.08);
    let harmonics: Vec<HarmonicTerm> = config
        .harmonics
        .iter()
        .take(16)
        .enumerate()
        .map(|(i, h)| {
            let drive = if i % 2 == 0 { energies.mid } else { energies.high };
            HarmonicTerm {
                frequency: h.frequency.clamp(1, 32),
                amplitude: clamp_or(h.weight, 0.0, 1.0, 0.0) * (constant + reactive * drive),
                phase: (clamp_or(h.speed, -8.0, 8.0, 0.0) * runtime.time).rem_euclid(TAU),
            }
        })
        .collect();

    runtime.stretch_angle = (runtime.stretch_angle + STRETCH_TURN_PER_SEC * dt).rem_euclid(TAU);
    let stretch = config.stretch.then(|| Stretch {
        angle: runtime.stretch_angle,
        length: clamp_or(config.stretch_strength, 0.0, 1.0, 0.35) * input.heartbeat() * runtime.gate,
    });

    let mut frame = BlobFrame {
        center: Vec2::splat(0.5),
        radius,
        harmonics,
        stretch,
        gate: runtime.gate,
        outline: Vec::new(),
        colour: config.colour.scaled(0.8 + 0.2 * energies.overall),
        glow: config.glow.with_alpha(config.glow.a * (0.5 + 0.5 * input.heartbeat())),
    };

    let points = config.outline_points.clamp(16, 512);
    frame.outline = (0..points)
        .map(|i| {
            let theta = i as f32 / points as f32 * TAU;
            frame.center + Vec2::from_angle(theta) * frame.radius_at(theta)
        })
        .collect();
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::test_support::Fixture;

    const DT: f32 = 1.0 / 60.0;

    fn settle(fixture: &Fixture, config: &BlobConfig, frames: usize) -> BlobFrame {
        let mut runtime = BlobRuntime::default();
        let mut frame = render(&fixture.input(0.0, DT), config, &mut runtime);
        for step in 1..frames {
            frame = render(&fixture.input(step as f32 * DT, DT), config, &mut runtime);
        }
        frame
    }

    fn spread(frame: &BlobFrame) -> f32 {
        let radii: Vec<f32> = frame.outline.iter().map(|p| (*p - frame.center).length()).collect();
        let max = radii.iter().copied().fold(f32::MIN, f32::max);
        let min = radii.iter().copied().fold(f32::MAX, f32::min);
        max - min
    }

    #[test]
    fn outline_lies_on_zero_distance() {
        let frame = settle(&Fixture::loud(0.6), &BlobConfig::default(), 30);
        for point in &frame.outline {
            assert!(frame.signed_distance(*point).abs() < 1e-4);
        }
        assert!(frame.signed_distance(frame.center) < 0.0);
        assert!(frame.signed_distance(Vec2::new(2.0, 2.0)) > 0.0);
    }

    #[test]
    fn never_static_in_silence() {
        let frame = settle(&Fixture::silent(), &BlobConfig::default(), 30);
        assert!(spread(&frame) > 0.0);
        assert!(frame.is_finite());
    }

    #[test]
    fn zero_reactive_weight_calms_the_boundary() {
        let fixture = Fixture::loud(0.9);
        let lively = settle(&fixture, &BlobConfig::default(), 30);
        let calm = settle(
            &fixture,
            &BlobConfig {
                reactive_wobble: 0.0,
                ..Default::default()
            },
            30,
        );
        let lively_amp: f32 = lively.harmonics.iter().map(|h| h.amplitude).sum();
        let calm_amp: f32 = calm.harmonics.iter().map(|h| h.amplitude).sum();
        assert!(calm_amp > 0.0);
        assert!(calm_amp < lively_amp);
    }

    #[test]
    fn gate_shrinks_toward_rest_when_stopped() {
        let config = BlobConfig::default();
        let playing = settle(&Fixture::loud(0.5), &config, 240);
        let mut stopped_fixture = Fixture::loud(0.5);
        stopped_fixture.playing = false;
        let stopped = settle(&stopped_fixture, &config, 240);

        assert!(playing.gate > 0.99);
        assert!(stopped.gate < 0.01);
        assert!(stopped.radius < playing.radius);
        assert!((stopped.radius - config.resting_radius).abs() < 0.01);
    }

    #[test]
    fn stretch_grows_a_tendril_on_transients() {
        let mut fixture = Fixture::loud(0.5);
        fixture.smoothed.heartbeat_intensity = 1.0;
        let config = BlobConfig {
            stretch: true,
            ..Default::default()
        };
        let frame = settle(&fixture, &config, 240);
        let stretch = frame.stretch.unwrap();
        assert!(stretch.length > 0.3);

        let tip = frame.radius_at(stretch.angle);
        let back = frame.radius_at(stretch.angle + std::f32::consts::PI);
        assert!(tip > back + 0.2);
    }
}
