//! Multi-trace oscilloscope with a comet-tail ghost trail.
//!
//! Ghosts are redrawn each frame from the waveform history published with
//! the smoothed state, so a smoothing reset clears the trail with it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    clamp_or,
    curve::{catmull_rom, points_finite, polyline},
    FrameInput,
};
use crate::{render::Rgba, BeatConfig};

/// Ghosts younger than this are not drawn: adjacent frames are too similar
/// after smoothing to read as separate traces.
pub const MIN_GHOST_AGE: usize = 2;
pub const MAX_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLineMode {
    /// Each line reads a phase-shifted window of the waveform.
    #[default]
    PhaseOffset,
    /// Each line reads the same window, offset and scaled by one band.
    BandBias,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub line_count: usize,
    pub line_mode: ScopeLineMode,
    /// Window shift between lines, as a fraction of the waveform.
    pub phase_offset: f32,
    pub band_bias: f32,
    pub amplitude: f32,
    pub control_points: usize,
    pub curve_samples: usize,
    /// Time constant of the per-point temporal smoothing.
    pub smoothing_secs: f32,
    pub line_width: f32,
    pub ghost_trail: bool,
    /// Oldest ghost, in analysis ticks of waveform history.
    pub ghost_depth: usize,
    pub ghost_alpha: f32,
    pub colours: [Rgba; MAX_LINES],
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            line_count: 2,
            line_mode: ScopeLineMode::PhaseOffset,
            phase_offset: 0.08,
            band_bias: 0.6,
            amplitude: 0.8,
            control_points: 48,
            curve_samples: 192,
            smoothing_secs: 0.05,
            line_width: 2.0,
            ghost_trail: true,
            ghost_depth: 6,
            ghost_alpha: 0.35,
            colours: [
                Rgba::rgb(0.3, 0.9, 1.0),
                Rgba::rgb(1.0, 0.35, 0.8),
                Rgba::rgb(1.0, 0.85, 0.3),
            ],
        }
    }
}

impl ScopeConfig {
    pub fn line_count(&self) -> usize {
        self.line_count.clamp(1, MAX_LINES)
    }

    pub fn ghost_depth(&self) -> usize {
        self.ghost_depth.clamp(MIN_GHOST_AGE, BeatConfig::MAX_HISTORY_DEPTH - 1)
    }

    pub fn control_points(&self) -> usize {
        self.control_points.clamp(8, 128)
    }

    pub fn curve_samples(&self) -> usize {
        self.curve_samples.clamp(32, 512)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeLine {
    pub points: Vec<Vec2>,
    pub width: f32,
    pub colour: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostTrace {
    /// Analysis ticks since the waveform was current.
    pub age: usize,
    pub points: Vec<Vec2>,
    pub colour: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeFrame {
    pub lines: Vec<ScopeLine>,
    /// Oldest first, so the host can draw them back to front.
    pub ghosts: Vec<GhostTrace>,
}

impl ScopeFrame {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        for line in &mut self.lines {
            f(&mut line.colour);
        }
        for ghost in &mut self.ghosts {
            f(&mut ghost.colour);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lines
            .iter()
            .all(|line| line.width.is_finite() && line.colour.is_finite() && points_finite(&line.points))
            && self
                .ghosts
                .iter()
                .all(|ghost| ghost.colour.is_finite() && points_finite(&ghost.points))
    }
}

#[derive(Debug, Clone)]
pub struct ScopeRuntime {
    controls: Vec<Vec<f32>>,
}

impl ScopeRuntime {
    pub fn new(config: &ScopeConfig) -> Self {
        Self {
            controls: vec![vec![0.0; config.control_points()]; config.line_count()],
        }
    }
}

/// Reads `count` evenly spaced samples of `waveform`, starting at fraction
/// `start` and wrapping around the end.
fn read_window(waveform: &[f32], start: f32, count: usize) -> Vec<f32> {
    if waveform.is_empty() {
        return vec![0.0; count];
    }
    let len = waveform.len();
    let offset = (start.rem_euclid(1.0) * len as f32) as usize;
    (0..count)
        .map(|k| {
            let v = waveform[(offset + k * len / count) % len];
            if v.is_finite() {
                v.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

pub fn render(input: &FrameInput<'_>, config: &ScopeConfig, runtime: &mut ScopeRuntime) -> ScopeFrame {
    let lines = config.line_count();
    let controls = config.control_points();
    let samples = config.curve_samples();
    let depth = config.ghost_depth();
    let amplitude = clamp_or(config.amplitude, 0.1, 2.0, 0.8);
    let phase_offset = clamp_or(config.phase_offset, 0.0, 0.5, 0.08);
    let bias = clamp_or(config.band_bias, 0.0, 1.0, 0.6);
    let tau = clamp_or(config.smoothing_secs, 0.0, 0.5, 0.05);
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);
    let alpha = if tau <= f32::EPSILON {
        1.0
    } else {
        1.0 - (-dt / tau).exp()
    };

    if runtime.controls.len() != lines || runtime.controls.iter().any(|c| c.len() != controls) {
        runtime.controls = vec![vec![0.0; controls]; lines];
    }

    let energies = input.energies();
    let drive = 0.7 + 0.5 * energies.overall;
    let waveform = &input.frame.waveform;

    // (window start, scale, vertical lift) for line `i`.
    let placement = |i: usize| match config.line_mode {
        ScopeLineMode::PhaseOffset => (phase_offset * i as f32, 1.0, 0.0),
        ScopeLineMode::BandBias => {
            let band = energies.band(i);
            (0.0, 1.0 - bias + bias * band, (band - 0.5) * bias * 0.3)
        }
    };

    let mut out = Vec::with_capacity(lines);
    for (i, smoothed) in runtime.controls.iter_mut().enumerate() {
        let (start, scale, lift) = placement(i);
        let target = read_window(waveform, start, controls);
        for (current, goal) in smoothed.iter_mut().zip(&target) {
            *current += (goal * amplitude * drive * scale + lift - *current) * alpha;
        }

        out.push(ScopeLine {
            points: polyline(&catmull_rom(smoothed, samples)),
            width: clamp_or(config.line_width, 0.5, 8.0, 2.0) * (1.0 + 0.5 * input.heartbeat()),
            colour: config.colours[i].clamped(),
        });
    }

    let mut ghosts = Vec::new();
    if let Some(primary) = out.first().filter(|_| config.ghost_trail) {
        let history = &input.smoothed.waveform_history;
        let base_alpha = clamp_or(config.ghost_alpha, 0.0, 1.0, 0.35);
        let (start, scale, lift) = placement(0);
        for age in (MIN_GHOST_AGE..=depth).rev() {
            let Some(past) = history.get_back(age) else {
                continue;
            };
            let values: Vec<f32> = read_window(past, start, controls)
                .into_iter()
                .map(|v| v * amplitude * drive * scale + lift)
                .collect();
            let fade = 1.0 - (age - 1) as f32 / depth as f32;
            ghosts.push(GhostTrace {
                age,
                points: polyline(&catmull_rom(&values, samples)),
                colour: primary.colour.with_alpha(primary.colour.a * base_alpha * fade),
            });
        }
    }

    ScopeFrame { lines: out, ghosts }
}
