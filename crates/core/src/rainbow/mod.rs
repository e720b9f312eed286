//! Rainbow colour cycle applied on top of every mode's output.
//!
//! The phase belongs to the engine, not to a mode: it is created with the
//! engine, survives every mode switch and keeps accumulating while the
//! effect is disabled, so toggling it back on never jumps.

use serde::{Deserialize, Serialize};

use crate::render::{RenderParameters, Rgba};

/// Colours below this saturation are treated as grey and forced to full
/// saturation before rotating, otherwise the hue shift has nothing to move.
pub const GREY_SATURATION: f32 = 0.05;
pub const MAX_SPEED: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RainbowSettings {
    pub enabled: bool,
    /// Hue cycles per second.
    pub speed: f32,
}

impl Default for RainbowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 0.1,
        }
    }
}

impl RainbowSettings {
    pub fn speed(&self) -> f32 {
        if self.speed.is_finite() {
            self.speed.clamp(0.0, MAX_SPEED)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct RainbowCycle {
    settings: RainbowSettings,
    /// Kept in f64 so a long session does not lose precision.
    phase: f64,
}

impl RainbowCycle {
    pub fn new(settings: RainbowSettings) -> Self {
        Self {
            settings,
            phase: 0.0,
        }
    }

    pub fn settings(&self) -> RainbowSettings {
        self.settings
    }

    /// Replaces the settings; the phase carries on from where it is.
    pub fn set_settings(&mut self, settings: RainbowSettings) {
        self.settings = settings;
    }

    /// Current phase in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        // Narrowing can round a value just below 1.0 up to 1.0.
        (self.phase as f32).rem_euclid(1.0)
    }

    pub fn advance(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.phase = (self.phase + dt as f64 * self.settings.speed() as f64).rem_euclid(1.0);
    }

    /// Hue-rotates every colour in `params` when enabled, recording the
    /// applied phase on the frame.
    pub fn apply(&self, params: &mut RenderParameters) {
        if !self.settings.enabled {
            params.rainbow_phase = None;
            return;
        }
        let phase = self.phase();
        params.for_each_colour_mut(&mut |colour| *colour = rotate_hue(*colour, phase));
        params.rainbow_phase = Some(phase);
    }
}

impl Default for RainbowCycle {
    fn default() -> Self {
        Self::new(RainbowSettings::default())
    }
}

/// Rotates `colour`'s hue by `phase` turns, saturating greys first.
pub fn rotate_hue(colour: Rgba, phase: f32) -> Rgba {
    let (hue, saturation, value) = colour.to_hsv();
    let saturation = if saturation < GREY_SATURATION { 1.0 } else { saturation };
    Rgba::from_hsv(hue + phase, saturation, value, colour.a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(speed: f32) -> RainbowCycle {
        RainbowCycle::new(RainbowSettings { enabled: true, speed })
    }

    #[test]
    fn phase_wraps_into_unit_range() {
        let mut cycle = enabled(0.5);
        for _ in 0..1000 {
            cycle.advance(0.037);
            assert!((0.0..1.0).contains(&cycle.phase()));
        }
    }

    #[test]
    fn phase_just_below_one_stays_below_one() {
        let mut cycle = enabled(1.0);
        cycle.phase = 1.0 - 1.0e-12;
        assert_eq!(cycle.phase(), 0.0);

        cycle.phase = 0.999_999_99;
        assert!((0.0..1.0).contains(&cycle.phase()));
    }

    #[test]
    fn keeps_accumulating_while_disabled() {
        let mut cycle = RainbowCycle::new(RainbowSettings {
            enabled: false,
            speed: 0.25,
        });
        cycle.advance(1.0);
        assert!((cycle.phase() - 0.25).abs() < 1e-6);

        let mut settings = cycle.settings();
        settings.enabled = true;
        cycle.set_settings(settings);
        assert!((cycle.phase() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn hostile_speed_and_dt_are_clamped() {
        let mut cycle = enabled(f32::INFINITY);
        cycle.advance(1.0);
        assert_eq!(cycle.phase(), 0.0);

        let mut cycle = enabled(100.0);
        cycle.advance(0.1);
        assert!((cycle.phase() - 0.2).abs() < 1e-6);
        cycle.advance(-5.0);
        cycle.advance(f32::NAN);
        assert!((cycle.phase() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn white_is_visibly_rotated() {
        let rotated = rotate_hue(Rgba::WHITE, 1.0 / 3.0);
        assert!(rotated.g > 0.99);
        assert!(rotated.r < 0.01 && rotated.b < 0.01);
    }

    #[test]
    fn hue_is_continuous_across_the_wrap() {
        let colour = Rgba::rgb(0.9, 0.2, 0.3);
        let before = rotate_hue(colour, 0.9999);
        let after = rotate_hue(colour, 0.0001);
        let gap = (before.r - after.r).abs() + (before.g - after.g).abs() + (before.b - after.b).abs();
        assert!(gap < 0.01);
    }

    #[test]
    fn alpha_is_preserved() {
        let rotated = rotate_hue(Rgba::new(0.2, 0.4, 0.8, 0.3), 0.5);
        assert_eq!(rotated.a, 0.3);
    }
}
