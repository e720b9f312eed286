//! Layered sine ribbons with wobble and travelling heartbeat bumps.

use std::f32::consts::TAU;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{clamp_or, curve::points_finite, FrameInput};
use crate::{analysis::BandEnergies, render::Rgba};

pub const MAX_LINES: usize = 3;

/// How far each line moves per unit of offset or shift. Outer lines move
/// further than the centre line and not symmetrically.
pub const LINE_WEIGHTS: [f32; MAX_LINES] = [0.0, 0.75, -1.35];

/// Share of the bump width on the leading side when travelling.
const LEADING_SHARE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Travel {
    None,
    Left,
    #[default]
    Right,
}

impl Travel {
    fn sign(self) -> f32 {
        match self {
            Travel::None => 0.0,
            Travel::Left => -1.0,
            Travel::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RibbonConfig {
    pub line_count: usize,
    /// Vertical separation per unit line weight.
    pub line_offset: f32,
    /// Phase separation per unit line weight, in radians.
    pub phase_shift: f32,
    /// Sine cycles across the width.
    pub frequency: f32,
    /// Phase scroll, radians per second.
    pub speed: f32,
    pub amplitude: f32,
    pub bass_amplitude: f32,
    /// Constant wobble, present even in silence.
    pub wobble: f32,
    /// Wobble scaled by mid/high energy, added on top of the constant layer.
    pub reactive_wobble: f32,
    pub wobble_frequency: f32,
    pub wobble_speed: f32,
    pub heartbeat_height: f32,
    /// Bump width as a fraction of the ribbon width.
    pub heartbeat_width: f32,
    pub travel: Travel,
    /// Bump travel, ribbon widths per second.
    pub travel_speed: f32,
    pub ghost: bool,
    pub ghost_alpha: f32,
    /// Age, in analysis ticks, of the energy snapshot the ghost is drawn from.
    pub ghost_lag: usize,
    pub samples: usize,
    pub line_width: f32,
    pub colours: [Rgba; MAX_LINES],
}

impl Default for RibbonConfig {
    fn default() -> Self {
        Self {
            line_count: 3,
            line_offset: 0.0,
            phase_shift: 0.0,
            frequency: 2.0,
            speed: 1.5,
            amplitude: 0.12,
            bass_amplitude: 0.3,
            wobble: 0.04,
            reactive_wobble: 0.06,
            wobble_frequency: 0.7,
            wobble_speed: 0.6,
            heartbeat_height: 0.25,
            heartbeat_width: 0.15,
            travel: Travel::Right,
            travel_speed: 0.35,
            ghost: true,
            ghost_alpha: 0.3,
            ghost_lag: 4,
            samples: 160,
            line_width: 2.5,
            colours: [
                Rgba::rgb(0.95, 0.95, 1.0),
                Rgba::rgb(0.55, 0.75, 1.0),
                Rgba::rgb(0.85, 0.5, 1.0),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RibbonLine {
    pub points: Vec<Vec2>,
    pub width: f32,
    pub colour: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RibbonFrame {
    pub lines: Vec<RibbonLine>,
    /// The first line without its heartbeat bump, shaped by slightly older
    /// energies so it trails the live line. Only when not travelling.
    pub ghost: Option<RibbonLine>,
    /// Horizontal centre of the heartbeat bump in `[0, 1]`.
    pub bump_center: f32,
}

impl RibbonFrame {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        for line in self.lines.iter_mut().chain(self.ghost.as_mut()) {
            f(&mut line.colour);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.bump_center.is_finite()
            && self
                .lines
                .iter()
                .chain(self.ghost.as_ref())
                .all(|line| line.width.is_finite() && line.colour.is_finite() && points_finite(&line.points))
    }
}

#[derive(Debug, Clone)]
pub struct RibbonRuntime {
    phase: f32,
    wobble_time: f32,
    bump_center: f32,
}

impl Default for RibbonRuntime {
    fn default() -> Self {
        Self {
            phase: 0.0,
            wobble_time: 0.0,
            bump_center: 0.5,
        }
    }
}

/// The constant and energy-reactive wobble offsets at `x`, returned
/// separately. The line uses their sum.
pub fn wobble_layers(x: f32, time: f32, config: &RibbonConfig, energies: BandEnergies) -> (f32, f32) {
    let frequency = clamp_or(config.wobble_frequency, 0.1, 4.0, 0.7);
    let speed = clamp_or(config.wobble_speed, 0.0, 4.0, 0.6);
    let constant = clamp_or(config.wobble, 0.0, 0.5, 0.04) * (TAU * frequency * x + speed * time).sin();

    let drive = 0.5 * (energies.mid + energies.high);
    let reactive = clamp_or(config.reactive_wobble, 0.0, 0.5, 0.06)
        * drive
        * (TAU * frequency * 2.3 * x - speed * 1.7 * time + 1.1).sin();
    (constant, reactive)
}

/// Unit-height triangular bump at signed distance `d` from its peak. When
/// travelling, the leading side is steeper so the peak leans forward.
pub fn heartbeat_bump(d: f32, width: f32, travel: Travel) -> f32 {
    let sign = travel.sign();
    let half = if sign == 0.0 {
        width
    } else if d * sign >= 0.0 {
        width * LEADING_SHARE * 2.0
    } else {
        width * (1.0 - LEADING_SHARE) * 2.0
    };
    (1.0 - d.abs() / half.max(1e-4)).max(0.0)
}

/// Smoothed energies from `lag` analysis ticks ago, read from the published
/// history. A short history yields its oldest entry; an empty one (right
/// after a reset) yields the current energies.
fn lagged_energies(input: &FrameInput<'_>, lag: usize) -> BandEnergies {
    let history = &input.smoothed.energy_history;
    history
        .get_back(lag.min(history.len().saturating_sub(1)))
        .map(|energies| energies.sanitized())
        .unwrap_or_else(|| input.energies())
}

pub fn render(input: &FrameInput<'_>, config: &RibbonConfig, runtime: &mut RibbonRuntime) -> RibbonFrame {
    let lines = config.line_count.clamp(1, MAX_LINES);
    let samples = config.samples.clamp(32, 512);
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);
    let energies = input.energies();

    let speed = clamp_or(config.speed, 0.0, 10.0, 1.5);
    runtime.phase = (runtime.phase + speed * dt * (1.0 + energies.overall)).rem_euclid(TAU);
    runtime.wobble_time += dt;
    if config.travel != Travel::None {
        let travel = clamp_or(config.travel_speed, 0.0, 2.0, 0.35);
        runtime.bump_center = (runtime.bump_center + travel * config.travel.sign() * dt).rem_euclid(1.0);
    } else {
        runtime.bump_center = 0.5;
    }

    let offset = clamp_or(config.line_offset, 0.0, 0.5, 0.0);
    let shift = clamp_or(config.phase_shift, 0.0, std::f32::consts::PI, 0.0);
    let frequency = clamp_or(config.frequency, 0.5, 8.0, 2.0);
    let base_amplitude = clamp_or(config.amplitude, 0.0, 1.0, 0.12);
    let bass_amplitude = clamp_or(config.bass_amplitude, 0.0, 1.0, 0.3);
    let bump_height = clamp_or(config.heartbeat_height, 0.0, 1.0, 0.25) * input.heartbeat();
    let bump_width = clamp_or(config.heartbeat_width, 0.02, 0.5, 0.15);
    let width = clamp_or(config.line_width, 0.5, 8.0, 2.5);

    let line_points = |weight: f32, energies: BandEnergies, with_bump: bool| -> Vec<Vec2> {
        let amplitude = base_amplitude + bass_amplitude * energies.bass;
        (0..samples)
            .map(|s| {
                let x = s as f32 / (samples - 1) as f32;
                let (constant, reactive) = wobble_layers(x, runtime.wobble_time, config, energies);
                let mut y = weight * offset
                    + amplitude * (TAU * frequency * x + runtime.phase + weight * shift).sin()
                    + constant
                    + reactive;
                if with_bump {
                    y += bump_height * heartbeat_bump(x - runtime.bump_center, bump_width, config.travel);
                }
                Vec2::new(x, y)
            })
            .collect()
    };

    let out: Vec<RibbonLine> = (0..lines)
        .map(|i| RibbonLine {
            points: line_points(LINE_WEIGHTS[i], energies, true),
            width,
            colour: config.colours[i].clamped(),
        })
        .collect();

    let ghost = (config.ghost && config.travel == Travel::None).then(|| RibbonLine {
        points: line_points(LINE_WEIGHTS[0], lagged_energies(input, config.ghost_lag), false),
        width,
        colour: config.colours[0].with_alpha(clamp_or(config.ghost_alpha, 0.0, 1.0, 0.3)),
    });

    RibbonFrame {
        lines: out,
        ghost,
        bump_center: runtime.bump_center,
    }
}
