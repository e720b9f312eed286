use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ModeConfigSet, ModeKind, RainbowSettings, Result};

/// Top-level configuration structure for the engine.
///
/// Every section is `#[serde(default)]` so partially written documents load;
/// numeric values are clamped where they are used rather than rejected here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub bands: BandConfig,
    pub beat: BeatConfig,
    pub rainbow: RainbowSettings,
    pub initial_mode: ModeKind,
    pub modes: ModeConfigSet,
    /// Capacity of the bounded telemetry channel.
    pub telemetry_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            bands: BandConfig::default(),
            beat: BeatConfig::default(),
            rainbow: RainbowSettings::default(),
            initial_mode: ModeKind::BarMeter,
            modes: ModeConfigSet::default(),
            telemetry_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Duration of one analysis block in seconds.
    pub fn block_duration(&self) -> f32 {
        self.audio.block_size.max(1) as f32 / self.audio.sample_rate.max(1) as f32
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Number of waveform samples carried on every frame.
    pub waveform_len: usize,
    /// Number of log-spaced spectrum bins carried on every frame.
    pub spectrum_bins: usize,
    /// How long the analysis thread waits for a block before re-checking
    /// its shutdown flag.
    pub poll_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
            waveform_len: 256,
            spectrum_bins: 64,
            poll_interval_ms: 20,
        }
    }
}

impl AudioConfig {
    pub fn waveform_len(&self) -> usize {
        self.waveform_len.clamp(16, 4096)
    }

    pub fn spectrum_bins(&self) -> usize {
        self.spectrum_bins.clamp(8, 512)
    }
}

/// Frequency band boundaries and loudness normalisation. The cutoffs are
/// tuning parameters calibrated against music, not structural constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub bass_min_hz: f32,
    pub bass_max_hz: f32,
    pub mid_max_hz: f32,
    pub high_max_hz: f32,
    /// Weights of bass, mid and high in the `overall` energy.
    pub overall_weights: [f32; 3],
    /// Half-life of the running loudness ceiling, in seconds.
    pub ceiling_half_life_secs: f32,
    /// Lower bound of the ceiling so near-silence is not amplified to full scale.
    pub min_ceiling: f32,
    /// Band magnitudes below this are treated as silence.
    pub noise_floor: f32,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            bass_min_hz: 20.0,
            bass_max_hz: 250.0,
            mid_max_hz: 4_000.0,
            high_max_hz: 16_000.0,
            overall_weights: [0.5, 0.3, 0.2],
            ceiling_half_life_secs: 6.0,
            min_ceiling: 0.01,
            noise_floor: 1.0e-4,
        }
    }
}

/// Asymmetric exponential smoothing: time constants in seconds for rising
/// and falling input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingCurve {
    pub attack_secs: f32,
    pub decay_secs: f32,
}

impl SmoothingCurve {
    /// Time constant used in place of a non-finite configured one.
    pub const FALLBACK_SECS: f32 = 0.1;

    pub const fn new(attack_secs: f32, decay_secs: f32) -> Self {
        Self {
            attack_secs,
            decay_secs,
        }
    }

    /// Moves `current` toward `target` over `dt` seconds.
    pub fn step(&self, current: f32, target: f32, dt: f32) -> f32 {
        let tau = if target > current {
            self.attack_secs
        } else {
            self.decay_secs
        };
        let tau = if tau.is_finite() {
            tau.clamp(1.0e-4, 10.0)
        } else {
            Self::FALLBACK_SECS
        };
        let alpha = 1.0 - (-dt.max(0.0) / tau).exp();
        current + (target - current) * alpha
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    pub overall: SmoothingCurve,
    pub bass: SmoothingCurve,
    pub mid: SmoothingCurve,
    pub high: SmoothingCurve,
    /// Length of the rolling bass average used for transient detection.
    pub transient_window_secs: f32,
    /// Bass must exceed the rolling average by this much to fire.
    pub transient_margin: f32,
    /// Bass below this never fires a transient.
    pub transient_min_bass: f32,
    pub min_transient_interval_secs: f32,
    /// Linear decay of `heartbeat_intensity`, per second.
    pub heartbeat_decay_per_sec: f32,
    /// Depth of the waveform and energy history rings (at most 32).
    pub history_depth: usize,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            overall: SmoothingCurve::new(0.03, 0.25),
            bass: SmoothingCurve::new(0.02, 0.18),
            mid: SmoothingCurve::new(0.03, 0.22),
            high: SmoothingCurve::new(0.015, 0.12),
            transient_window_secs: 0.35,
            transient_margin: 0.12,
            transient_min_bass: 0.08,
            min_transient_interval_secs: 0.12,
            heartbeat_decay_per_sec: 4.0,
            history_depth: 16,
        }
    }
}

impl BeatConfig {
    pub const MAX_HISTORY_DEPTH: usize = 32;

    pub fn history_depth(&self) -> usize {
        self.history_depth.clamp(1, Self::MAX_HISTORY_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fill_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "audio": { "block_size": 512 } }"#).unwrap();
        assert_eq!(config.audio.block_size, 512);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.initial_mode, ModeKind::BarMeter);
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = EngineConfig::default();
        config.initial_mode = ModeKind::Starfield;
        let text = config.to_json_pretty().unwrap();
        let parsed = EngineConfig::from_json_str(&text).unwrap();
        assert_eq!(parsed.initial_mode, ModeKind::Starfield);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::OverlayError::Config(_)));
    }

    #[test]
    fn smoothing_rises_faster_than_it_falls() {
        let curve = SmoothingCurve::new(0.02, 0.2);
        let up = curve.step(0.0, 1.0, 0.02);
        let down = 1.0 - curve.step(1.0, 0.0, 0.02);
        assert!(up > down);
    }

    #[test]
    fn non_finite_time_constants_still_converge() {
        for curve in [
            SmoothingCurve::new(f32::NAN, 0.2),
            SmoothingCurve::new(0.02, f32::INFINITY),
            SmoothingCurve::new(f32::NEG_INFINITY, f32::NAN),
        ] {
            let mut value = 0.0;
            for _ in 0..60 {
                value = curve.step(value, 1.0, 1.0 / 60.0);
            }
            assert!(value.is_finite());
            assert!(value > 0.9, "{curve:?} stalled at {value}");

            for _ in 0..60 {
                value = curve.step(value, 0.0, 1.0 / 60.0);
            }
            assert!(value < 0.1, "{curve:?} stalled at {value}");
        }
    }

    #[test]
    fn history_depth_is_capped() {
        let beat = BeatConfig {
            history_depth: 500,
            ..Default::default()
        };
        assert_eq!(beat.history_depth(), 32);
    }
}
