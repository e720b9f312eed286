//! Temporal smoothing and transient ("heartbeat") detection on top of the
//! per-tick energies produced by the extractor.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tracing::{debug, trace};

use crate::{
    analysis::{unit, BandEnergies},
    history::{RingBuffer, RollingAverage},
    BeatConfig, EnergyFrame,
};

/// Largest frame delta folded into smoothing; longer gaps are treated as
/// this long so a stalled capture does not snap everything to its target.
const MAX_TICK_SECS: f32 = 0.25;

/// Smoothed, transient-aware view of the audio owned by [`BeatEngine`].
#[derive(Debug, Clone)]
pub struct SmoothedState {
    pub overall: f32,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    /// Rolling short-term average of instantaneous bass.
    pub bass_average: f32,
    /// 1.0 on a detected transient, decaying linearly toward zero.
    pub heartbeat_intensity: f32,
    /// Number of transients detected since the last reset.
    pub transient_count: u64,
    pub energy_history: RingBuffer<BandEnergies>,
    pub waveform_history: RingBuffer<Arc<[f32]>>,
}

impl SmoothedState {
    /// The zero baseline every mode starts from after a switch.
    pub fn zeroed(history_depth: usize) -> Self {
        Self {
            overall: 0.0,
            bass: 0.0,
            mid: 0.0,
            high: 0.0,
            bass_average: 0.0,
            heartbeat_intensity: 0.0,
            transient_count: 0,
            energy_history: RingBuffer::with_capacity(history_depth),
            waveform_history: RingBuffer::with_capacity(history_depth),
        }
    }

    pub fn energies(&self) -> BandEnergies {
        BandEnergies {
            overall: self.overall,
            bass: self.bass,
            mid: self.mid,
            high: self.high,
        }
    }

    pub fn history_depth(&self) -> usize {
        self.energy_history.capacity()
    }

    pub fn is_zeroed(&self) -> bool {
        self.energies() == BandEnergies::ZERO
            && self.bass_average == 0.0
            && self.heartbeat_intensity == 0.0
            && self.energy_history.is_empty()
            && self.waveform_history.is_empty()
    }
}

/// Result of folding one frame into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTick {
    pub transient: bool,
    pub dt: f32,
}

#[derive(Debug)]
pub struct BeatEngine {
    config: BeatConfig,
    state: SmoothedState,
    bass_window: RollingAverage,
    default_dt: f32,
    last_timestamp: Option<f64>,
    clock: f64,
    last_transient_at: Option<f64>,
}

impl BeatEngine {
    /// `block_duration` is the nominal analysis cadence in seconds; it sizes
    /// the rolling bass window and stands in for the first tick's delta.
    pub fn new(config: BeatConfig, block_duration: f32) -> Self {
        let default_dt = if block_duration.is_finite() && block_duration > 0.0 {
            block_duration.min(MAX_TICK_SECS)
        } else {
            1.0 / 48.0
        };
        let window_ticks = (config.transient_window_secs.max(0.0) / default_dt).round() as usize;
        let depth = config.history_depth();

        debug!(
            window_ticks = window_ticks.clamp(2, 64),
            history_depth = depth,
            "beat engine created"
        );

        Self {
            state: SmoothedState::zeroed(depth),
            bass_window: RollingAverage::new(window_ticks.clamp(2, 64)),
            default_dt,
            last_timestamp: None,
            clock: 0.0,
            last_transient_at: None,
            config,
        }
    }

    pub fn state(&self) -> &SmoothedState {
        &self.state
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    /// Folds one frame into the smoothed state.
    pub fn update(&mut self, frame: &EnergyFrame) -> BeatTick {
        let dt = self.tick_delta(frame.timestamp);
        self.clock += dt as f64;

        let input = frame.energies().sanitized();
        let state = &mut self.state;
        state.overall = unit(self.config.overall.step(state.overall, input.overall, dt));
        state.bass = unit(self.config.bass.step(state.bass, input.bass, dt));
        state.mid = unit(self.config.mid.step(state.mid, input.mid, dt));
        state.high = unit(self.config.high.step(state.high, input.high, dt));

        let decay = self.config.heartbeat_decay_per_sec.max(0.0);
        state.heartbeat_intensity = (state.heartbeat_intensity - decay * dt).clamp(0.0, 1.0);

        // Compare against the window before this tick joins it.
        let average = self.bass_window.mean();
        let cooled_down = self
            .last_transient_at
            .map(|at| self.clock - at >= self.config.min_transient_interval_secs.max(0.0) as f64)
            .unwrap_or(true);
        let transient = input.bass >= self.config.transient_min_bass
            && input.bass > average + self.config.transient_margin.max(0.0)
            && cooled_down;

        if transient {
            state.heartbeat_intensity = 1.0;
            state.transient_count += 1;
            self.last_transient_at = Some(self.clock);
            trace!(bass = input.bass, average, "transient detected");
        }

        self.bass_window.push(input.bass);
        state.bass_average = unit(self.bass_window.mean());
        state.energy_history.push(state.energies());
        state.waveform_history.push(frame.waveform.clone());

        BeatTick { transient, dt }
    }

    /// Zeroes every smoothed value, both history rings and the rolling bass
    /// average. Timing is kept so the next tick still gets a sane delta.
    pub fn reset_smoothing_state(&mut self) {
        self.state = SmoothedState::zeroed(self.config.history_depth());
        self.bass_window.clear();
        self.last_transient_at = None;
        debug!("beat engine smoothing state reset");
    }

    fn tick_delta(&mut self, timestamp: f64) -> f32 {
        let dt = match self.last_timestamp {
            Some(last) if timestamp.is_finite() && timestamp > last => (timestamp - last) as f32,
            _ => self.default_dt,
        };
        if timestamp.is_finite() {
            self.last_timestamp = Some(timestamp);
        }
        dt.clamp(0.0, MAX_TICK_SECS)
    }
}

/// Cross-thread request to reset the beat engine's smoothing state.
///
/// The render side bumps the epoch once per mode switch; the analysis side
/// compares it with the last epoch it applied before each tick.
#[derive(Debug, Clone, Default)]
pub struct ResetSignal {
    epoch: Arc<AtomicU64>,
}

impl ResetSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a reset and returns the new epoch.
    pub fn request(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SmoothingCurve;

    fn frame(bass: f32, timestamp: f64) -> EnergyFrame {
        let mut frame = EnergyFrame::silent(8, 8, timestamp, 0);
        frame.bass = bass;
        frame.mid = bass * 0.5;
        frame.high = bass * 0.25;
        frame.overall = bass * 0.6;
        frame
    }

    fn engine() -> BeatEngine {
        BeatEngine::new(BeatConfig::default(), 0.02)
    }

    #[test]
    fn attack_is_faster_than_decay() {
        let mut engine = engine();
        engine.update(&frame(1.0, 0.02));
        let risen = engine.state().bass;
        for i in 0..20 {
            engine.update(&frame(1.0, 0.04 + i as f64 * 0.02));
        }
        let settled = engine.state().bass;
        engine.update(&frame(0.0, 0.44));
        let fallen = settled - engine.state().bass;

        assert!(risen > 0.5, "risen {risen}");
        assert!(fallen < risen, "fallen {fallen} risen {risen}");
    }

    #[test]
    fn nan_curves_fall_back_instead_of_freezing() {
        let config = BeatConfig {
            overall: SmoothingCurve::new(f32::NAN, f32::NAN),
            bass: SmoothingCurve::new(f32::NAN, 0.18),
            ..Default::default()
        };
        let mut engine = BeatEngine::new(config, 0.02);
        for i in 0..30 {
            engine.update(&frame(0.9, 0.02 + i as f64 * 0.02));
        }
        let state = engine.state();
        assert!(state.bass > 0.8, "bass {}", state.bass);
        assert!(state.overall > 0.4, "overall {}", state.overall);
    }

    #[test]
    fn malformed_energies_are_clamped() {
        let mut engine = engine();
        let mut bad = frame(0.0, 0.02);
        bad.bass = f32::NAN;
        bad.mid = 7.0;
        bad.high = -3.0;
        bad.overall = f32::INFINITY;
        engine.update(&bad);

        let state = engine.state();
        for value in [state.overall, state.bass, state.mid, state.high] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn transient_sets_heartbeat_to_one_then_decays_linearly() {
        let mut engine = engine();
        for i in 0..20 {
            engine.update(&frame(0.05, i as f64 * 0.02));
        }
        let tick = engine.update(&frame(0.9, 0.42));
        assert!(tick.transient);
        assert_eq!(engine.state().heartbeat_intensity, 1.0);

        let mut previous = 1.0;
        for i in 0..40 {
            engine.update(&frame(0.05, 0.44 + i as f64 * 0.02));
            let current = engine.state().heartbeat_intensity;
            assert!(current <= previous);
            previous = current;
        }
        assert_eq!(previous, 0.0);

        // Four per second over 0.02 s ticks.
        let mut engine = BeatEngine::new(BeatConfig::default(), 0.02);
        engine.update(&frame(0.9, 0.0));
        engine.update(&frame(0.9, 0.02));
        assert!((engine.state().heartbeat_intensity - 0.92).abs() < 1e-4);
    }

    #[test]
    fn sustained_bass_does_not_retrigger() {
        let mut engine = engine();
        let mut transients = 0;
        for i in 0..100 {
            if engine.update(&frame(0.8, i as f64 * 0.02)).transient {
                transients += 1;
            }
        }
        assert_eq!(transients, 1);
    }

    #[test]
    fn min_interval_limits_rapid_transients() {
        let config = BeatConfig {
            min_transient_interval_secs: 0.5,
            ..Default::default()
        };
        let mut engine = BeatEngine::new(config, 0.02);
        let mut fired = 0;
        for i in 0..20 {
            let bass = if i % 2 == 0 { 0.9 } else { 0.0 };
            if engine.update(&frame(bass, i as f64 * 0.02)).transient {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut engine = engine();
        for i in 0..30 {
            engine.update(&frame(0.9, i as f64 * 0.02));
        }
        assert!(!engine.state().is_zeroed());

        engine.reset_smoothing_state();
        assert!(engine.state().is_zeroed());
        assert_eq!(engine.state().transient_count, 0);
    }

    #[test]
    fn history_is_bounded_by_depth() {
        let config = BeatConfig {
            history_depth: 6,
            ..Default::default()
        };
        let mut engine = BeatEngine::new(config, 0.02);
        for i in 0..50 {
            engine.update(&frame(0.3, i as f64 * 0.02));
        }
        assert_eq!(engine.state().energy_history.len(), 6);
        assert_eq!(engine.state().waveform_history.len(), 6);
    }

    #[test]
    fn reset_signal_counts_requests() {
        let signal = ResetSignal::new();
        let observer = signal.clone();
        assert_eq!(observer.epoch(), 0);
        assert_eq!(signal.request(), 1);
        assert_eq!(signal.request(), 2);
        assert_eq!(observer.epoch(), 2);
    }
}
