//! Spectrum bar meter with peak ghosts.

use serde::{Deserialize, Serialize};

use super::{clamp_or, finite_or, FrameInput};
use crate::{render::Rgba, SmoothingCurve};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BevelDirection {
    None,
    #[default]
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarConfig {
    pub bar_count: usize,
    /// Zero selects the continuous style.
    pub segment_count: usize,
    /// Gap between segments as a fraction of one segment.
    pub segment_gap: f32,
    /// Gap between bars as a fraction of one bar slot.
    pub bar_gap: f32,
    pub gain: f32,
    /// Heights approach this ceiling but never reach it.
    pub soft_ceiling: f32,
    pub rise: SmoothingCurve,
    pub peak_hold_secs: f32,
    pub peak_decay_per_sec: f32,
    pub ghost_alpha: f32,
    pub idle_height: f32,
    pub bevel: BevelDirection,
    pub bevel_size: f32,
    pub colour: Rgba,
    pub peak_colour: Rgba,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            bar_count: 32,
            segment_count: 16,
            segment_gap: 0.2,
            bar_gap: 0.25,
            gain: 1.2,
            soft_ceiling: 0.92,
            rise: SmoothingCurve::new(0.02, 0.12),
            peak_hold_secs: 0.3,
            peak_decay_per_sec: 0.5,
            ghost_alpha: 0.55,
            idle_height: 0.015,
            bevel: BevelDirection::Up,
            bevel_size: 0.18,
            colour: Rgba::rgb(0.25, 0.85, 0.55),
            peak_colour: Rgba::WHITE,
        }
    }
}

impl BarConfig {
    pub fn bar_count(&self) -> usize {
        self.bar_count.clamp(4, 96)
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count.min(48)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum BarStyle {
    Continuous,
    Segmented { count: u32, gap: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bevel {
    pub direction: BevelDirection,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Left edge in `[0, 1]`.
    pub x: f32,
    pub width: f32,
    pub height: f32,
    /// Peak ghost position, never below `height`.
    pub peak: f32,
    pub peak_alpha: f32,
    /// Fully lit segments; zero in the continuous style.
    pub lit_segments: u32,
    /// Fill of the segment above the last lit one.
    pub partial_segment: f32,
    pub colour: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarFrame {
    pub style: BarStyle,
    pub bevel: Bevel,
    pub bars: Vec<Bar>,
    pub peak_colour: Rgba,
}

impl BarFrame {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        for bar in &mut self.bars {
            f(&mut bar.colour);
        }
        f(&mut self.peak_colour);
    }

    pub fn is_finite(&self) -> bool {
        self.bevel.size.is_finite()
            && self.peak_colour.is_finite()
            && self.bars.iter().all(|bar| {
                bar.x.is_finite()
                    && bar.width.is_finite()
                    && bar.height.is_finite()
                    && bar.peak.is_finite()
                    && bar.peak_alpha.is_finite()
                    && bar.partial_segment.is_finite()
                    && bar.colour.is_finite()
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BarRuntime {
    heights: Vec<f32>,
    peaks: Vec<f32>,
    peak_ages: Vec<f32>,
}

impl BarRuntime {
    pub fn new(config: &BarConfig) -> Self {
        let mut runtime = Self::default();
        runtime.resize(config.bar_count());
        runtime
    }

    fn resize(&mut self, count: usize) {
        if self.heights.len() != count {
            self.heights = vec![0.0; count];
            self.peaks = vec![0.0; count];
            self.peak_ages = vec![0.0; count];
        }
    }
}

/// Compresses values above a knee so they approach `ceiling` asymptotically.
pub fn soft_clamp(value: f32, ceiling: f32) -> f32 {
    let value = value.max(0.0);
    let knee = ceiling * 0.7;
    if value <= knee {
        return value;
    }
    let headroom = ceiling - knee;
    knee + headroom * (1.0 - (-(value - knee) / headroom).exp())
}

/// Energy of spectrum slice `index` of `count`.
fn slice_level(spectrum: &[f32], index: usize, count: usize) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let start = index * spectrum.len() / count;
    let end = ((index + 1) * spectrum.len() / count).max(start + 1).min(spectrum.len());
    let slice = &spectrum[start.min(spectrum.len() - 1)..end];

    let (peak, sum) = slice
        .iter()
        .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
        .fold((0.0f32, 0.0f32), |(peak, sum), v| (peak.max(v), sum + v));
    let mean = sum / slice.len() as f32;
    0.65 * peak + 0.35 * mean
}

pub fn render(input: &FrameInput<'_>, config: &BarConfig, runtime: &mut BarRuntime) -> BarFrame {
    let count = config.bar_count();
    runtime.resize(count);

    let gain = clamp_or(config.gain, 0.1, 4.0, 1.2);
    let ceiling = clamp_or(config.soft_ceiling, 0.5, 0.98, 0.92);
    let hold = clamp_or(config.peak_hold_secs, 0.0, 2.0, 0.3);
    let decay = clamp_or(config.peak_decay_per_sec, 0.05, 4.0, 0.5);
    let ghost_alpha = clamp_or(config.ghost_alpha, 0.0, 1.0, 0.55);
    let idle = clamp_or(config.idle_height, 0.0, 0.1, 0.015);
    let bar_gap = clamp_or(config.bar_gap, 0.0, 0.8, 0.25);
    let punch = 0.9 + 0.2 * input.heartbeat();
    let dt = clamp_or(input.dt, 0.0, 0.25, 0.0);

    let segments = config.segment_count();
    let style = if segments == 0 {
        BarStyle::Continuous
    } else {
        BarStyle::Segmented {
            count: segments as u32,
            gap: clamp_or(config.segment_gap, 0.0, 0.6, 0.2),
        }
    };

    let slot = 1.0 / count as f32;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let target = soft_clamp(slice_level(&input.frame.spectrum, i, count) * gain * punch, ceiling);
        let height = finite_or(config.rise.step(runtime.heights[i], target, dt), 0.0).clamp(0.0, ceiling);
        runtime.heights[i] = height;

        if height >= runtime.peaks[i] {
            runtime.peaks[i] = height;
            runtime.peak_ages[i] = 0.0;
        } else {
            runtime.peak_ages[i] += dt;
            if runtime.peak_ages[i] > hold {
                runtime.peaks[i] = (runtime.peaks[i] - decay * dt).max(height);
            }
        }

        let shown = height.max(idle);
        let peak = runtime.peaks[i].max(shown);
        let peak_alpha = ghost_alpha * ((peak - shown) / 0.05).clamp(0.0, 1.0);

        let (lit_segments, partial_segment) = match style {
            BarStyle::Continuous => (0, 0.0),
            BarStyle::Segmented { count, .. } => {
                let filled = shown * count as f32;
                (filled.floor() as u32, filled.fract())
            }
        };

        bars.push(Bar {
            x: i as f32 * slot + bar_gap * slot * 0.5,
            width: slot * (1.0 - bar_gap),
            height: shown,
            peak,
            peak_alpha,
            lit_segments,
            partial_segment,
            colour: config.colour.scaled(0.75 + 0.25 * shown / ceiling),
        });
    }

    BarFrame {
        style,
        bevel: Bevel {
            direction: config.bevel,
            size: clamp_or(config.bevel_size, 0.0, 0.5, 0.18),
        },
        bars,
        peak_colour: config.peak_colour.clamped(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::test_support::Fixture;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn soft_clamp_never_pins() {
        assert_eq!(soft_clamp(0.3, 0.92), 0.3);
        assert!(soft_clamp(1.0, 0.92) < 0.92);
        assert!(soft_clamp(50.0, 0.92) <= 0.92);
        assert!(soft_clamp(2.0, 0.92) > soft_clamp(1.0, 0.92));
    }

    #[test]
    fn loud_input_stays_below_full_height() {
        let config = BarConfig::default();
        let mut runtime = BarRuntime::new(&config);
        let fixture = Fixture::loud(1.0);

        let mut frame = render(&fixture.input(0.0, DT), &config, &mut runtime);
        for step in 1..120 {
            frame = render(&fixture.input(step as f32 * DT, DT), &config, &mut runtime);
        }
        assert!(frame.bars.iter().all(|bar| bar.height < 1.0 && bar.height > 0.5));
    }

    #[test]
    fn peak_holds_then_decays_toward_bar() {
        let config = BarConfig::default();
        let mut runtime = BarRuntime::new(&config);
        let mut fixture = Fixture::loud(0.8);
        for step in 0..60 {
            render(&fixture.input(step as f32 * DT, DT), &config, &mut runtime);
        }

        fixture.set_level(0.0);
        let first = render(&fixture.input(1.0, DT), &config, &mut runtime);
        assert!(first.bars[0].peak > first.bars[0].height);
        assert!(first.bars[0].peak_alpha > 0.0);

        let mut last = first.clone();
        for step in 0..(60 * 4) {
            last = render(&fixture.input(1.0 + step as f32 * DT, DT), &config, &mut runtime);
        }
        assert!(last.bars[0].peak < first.bars[0].peak);
        assert!((last.bars[0].peak - last.bars[0].height).abs() < 1e-4);
        assert_eq!(last.bars[0].peak_alpha, 0.0);
    }

    #[test]
    fn continuous_style_has_no_segments() {
        let config = BarConfig {
            segment_count: 0,
            ..Default::default()
        };
        let mut runtime = BarRuntime::new(&config);
        let frame = render(&Fixture::loud(0.5).input(0.0, DT), &config, &mut runtime);
        assert_eq!(frame.style, BarStyle::Continuous);
        assert!(frame.bars.iter().all(|bar| bar.lit_segments == 0));
    }

    #[test]
    fn out_of_range_config_is_clamped() {
        let config = BarConfig {
            bar_count: 10_000,
            gain: f32::NAN,
            bar_gap: 5.0,
            ..Default::default()
        };
        let mut runtime = BarRuntime::new(&config);
        let frame = render(&Fixture::loud(0.5).input(0.0, DT), &config, &mut runtime);
        assert_eq!(frame.bars.len(), 96);
        assert!(frame.is_finite());
        assert!(frame.bars.iter().all(|bar| bar.width > 0.0));
    }

    #[test]
    fn non_finite_rise_curve_still_tracks_audio() {
        let config = BarConfig {
            rise: SmoothingCurve::new(f32::NAN, f32::NAN),
            ..Default::default()
        };
        let mut runtime = BarRuntime::new(&config);
        let fixture = Fixture::loud(0.9);

        let mut frame = render(&fixture.input(0.0, DT), &config, &mut runtime);
        for step in 1..30 {
            frame = render(&fixture.input(step as f32 * DT, DT), &config, &mut runtime);
        }
        assert!(runtime.heights.iter().all(|h| h.is_finite()));
        assert!(frame.bars[0].height > 0.5, "bar stuck at {}", frame.bars[0].height);
    }

    #[test]
    fn silence_shows_idle_floor() {
        let config = BarConfig::default();
        let mut runtime = BarRuntime::new(&config);
        let frame = render(&Fixture::silent().input(0.0, DT), &config, &mut runtime);
        assert!(frame.bars.iter().all(|bar| bar.height == config.idle_height));
    }
}
