//! Visualization modes.
//!
//! The mode set is closed: [`ModeKind`] names it, [`ModeConfig`] and
//! [`ModeConfigSet`] carry per-mode tuning that survives switching, and
//! [`ModeRuntimeState`] carries per-activation state that does not. Every
//! algorithm is a function of a [`FrameInput`], its configuration and its
//! runtime state; dispatch is a `match`.

pub mod bars;
pub mod blob;
pub mod bubbles;
pub mod curve;
pub mod helix;
pub mod oscilloscope;
pub mod ribbon;
pub mod starfield;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::BandEnergies, render::Capability, EnergyFrame, ModeParameters, OverlayError,
    SmoothedState,
};

use self::{
    bars::{BarConfig, BarRuntime},
    blob::{BlobConfig, BlobRuntime},
    bubbles::{BubbleConfig, BubbleRuntime},
    helix::{HelixConfig, HelixRuntime},
    oscilloscope::{ScopeConfig, ScopeRuntime},
    ribbon::{RibbonConfig, RibbonRuntime},
    starfield::{StarfieldConfig, StarfieldRuntime},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    BarMeter,
    Oscilloscope,
    SineRibbon,
    Blob,
    BubbleField,
    Helix,
    Starfield,
}

impl ModeKind {
    pub const ALL: [ModeKind; 7] = [
        ModeKind::BarMeter,
        ModeKind::Oscilloscope,
        ModeKind::SineRibbon,
        ModeKind::Blob,
        ModeKind::BubbleField,
        ModeKind::Helix,
        ModeKind::Starfield,
    ];

    /// The mode every failed activation falls back to. It needs no optional
    /// capability, so it is never probed.
    pub const fn baseline() -> Self {
        ModeKind::BarMeter
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModeKind::BarMeter => "bar_meter",
            ModeKind::Oscilloscope => "oscilloscope",
            ModeKind::SineRibbon => "sine_ribbon",
            ModeKind::Blob => "blob",
            ModeKind::BubbleField => "bubble_field",
            ModeKind::Helix => "helix",
            ModeKind::Starfield => "starfield",
        }
    }

    pub fn required_capabilities(&self) -> &'static [Capability] {
        match self {
            ModeKind::BarMeter => &[],
            ModeKind::Oscilloscope => &[Capability::AntialiasedLines, Capability::AlphaBlending],
            ModeKind::SineRibbon => &[Capability::AntialiasedLines],
            ModeKind::Blob => &[Capability::ShaderPrograms],
            ModeKind::BubbleField => &[Capability::ShaderPrograms, Capability::AlphaBlending],
            ModeKind::Helix => &[Capability::AntialiasedLines],
            ModeKind::Starfield => &[Capability::ShaderPrograms, Capability::FloatTextures],
        }
    }
}

impl Default for ModeKind {
    fn default() -> Self {
        Self::baseline()
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModeKind {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        ModeKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| OverlayError::UnknownMode(s.to_string()))
    }
}

/// One whole-value configuration replacement for a single mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "config", rename_all = "snake_case")]
pub enum ModeConfig {
    BarMeter(BarConfig),
    Oscilloscope(ScopeConfig),
    SineRibbon(RibbonConfig),
    Blob(BlobConfig),
    BubbleField(BubbleConfig),
    Helix(HelixConfig),
    Starfield(StarfieldConfig),
}

impl ModeConfig {
    pub fn kind(&self) -> ModeKind {
        match self {
            ModeConfig::BarMeter(_) => ModeKind::BarMeter,
            ModeConfig::Oscilloscope(_) => ModeKind::Oscilloscope,
            ModeConfig::SineRibbon(_) => ModeKind::SineRibbon,
            ModeConfig::Blob(_) => ModeKind::Blob,
            ModeConfig::BubbleField(_) => ModeKind::BubbleField,
            ModeConfig::Helix(_) => ModeKind::Helix,
            ModeConfig::Starfield(_) => ModeKind::Starfield,
        }
    }
}

/// One configuration per mode; each persists independently of which mode is
/// active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfigSet {
    pub bar_meter: BarConfig,
    pub oscilloscope: ScopeConfig,
    pub sine_ribbon: RibbonConfig,
    pub blob: BlobConfig,
    pub bubble_field: BubbleConfig,
    pub helix: HelixConfig,
    pub starfield: StarfieldConfig,
}

impl ModeConfigSet {
    pub fn get(&self, kind: ModeKind) -> ModeConfig {
        match kind {
            ModeKind::BarMeter => ModeConfig::BarMeter(self.bar_meter.clone()),
            ModeKind::Oscilloscope => ModeConfig::Oscilloscope(self.oscilloscope.clone()),
            ModeKind::SineRibbon => ModeConfig::SineRibbon(self.sine_ribbon.clone()),
            ModeKind::Blob => ModeConfig::Blob(self.blob.clone()),
            ModeKind::BubbleField => ModeConfig::BubbleField(self.bubble_field.clone()),
            ModeKind::Helix => ModeConfig::Helix(self.helix.clone()),
            ModeKind::Starfield => ModeConfig::Starfield(self.starfield.clone()),
        }
    }

    /// Returns a copy with one mode's configuration replaced.
    pub fn with(&self, config: ModeConfig) -> Self {
        let mut next = self.clone();
        match config {
            ModeConfig::BarMeter(c) => next.bar_meter = c,
            ModeConfig::Oscilloscope(c) => next.oscilloscope = c,
            ModeConfig::SineRibbon(c) => next.sine_ribbon = c,
            ModeConfig::Blob(c) => next.blob = c,
            ModeConfig::BubbleField(c) => next.bubble_field = c,
            ModeConfig::Helix(c) => next.helix = c,
            ModeConfig::Starfield(c) => next.starfield = c,
        }
        next
    }
}

/// Per-activation state. Built fresh on activation, dropped on switch.
#[derive(Debug, Clone)]
pub enum ModeRuntimeState {
    BarMeter(BarRuntime),
    Oscilloscope(ScopeRuntime),
    SineRibbon(RibbonRuntime),
    Blob(BlobRuntime),
    BubbleField(BubbleRuntime),
    Helix(HelixRuntime),
    Starfield(StarfieldRuntime),
}

impl ModeRuntimeState {
    pub fn fresh(kind: ModeKind, configs: &ModeConfigSet) -> Self {
        match kind {
            ModeKind::BarMeter => Self::BarMeter(BarRuntime::new(&configs.bar_meter)),
            ModeKind::Oscilloscope => Self::Oscilloscope(ScopeRuntime::new(&configs.oscilloscope)),
            ModeKind::SineRibbon => Self::SineRibbon(RibbonRuntime::default()),
            ModeKind::Blob => Self::Blob(BlobRuntime::default()),
            ModeKind::BubbleField => Self::BubbleField(BubbleRuntime::new(&configs.bubble_field)),
            ModeKind::Helix => Self::Helix(HelixRuntime::default()),
            ModeKind::Starfield => Self::Starfield(StarfieldRuntime::default()),
        }
    }

    pub fn kind(&self) -> ModeKind {
        match self {
            Self::BarMeter(_) => ModeKind::BarMeter,
            Self::Oscilloscope(_) => ModeKind::Oscilloscope,
            Self::SineRibbon(_) => ModeKind::SineRibbon,
            Self::Blob(_) => ModeKind::Blob,
            Self::BubbleField(_) => ModeKind::BubbleField,
            Self::Helix(_) => ModeKind::Helix,
            Self::Starfield(_) => ModeKind::Starfield,
        }
    }

    /// Runs the algorithm matching this runtime state.
    pub fn render(&mut self, configs: &ModeConfigSet, input: &FrameInput<'_>) -> ModeParameters {
        match self {
            Self::BarMeter(rt) => ModeParameters::BarMeter(bars::render(input, &configs.bar_meter, rt)),
            Self::Oscilloscope(rt) => {
                ModeParameters::Oscilloscope(oscilloscope::render(input, &configs.oscilloscope, rt))
            }
            Self::SineRibbon(rt) => ModeParameters::SineRibbon(ribbon::render(input, &configs.sine_ribbon, rt)),
            Self::Blob(rt) => ModeParameters::Blob(blob::render(input, &configs.blob, rt)),
            Self::BubbleField(rt) => {
                ModeParameters::BubbleField(bubbles::render(input, &configs.bubble_field, rt))
            }
            Self::Helix(rt) => ModeParameters::Helix(helix::render(input, &configs.helix, rt)),
            Self::Starfield(rt) => ModeParameters::Starfield(starfield::render(input, &configs.starfield, rt)),
        }
    }
}

/// Everything a mode algorithm reads for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub frame: &'a EnergyFrame,
    pub smoothed: &'a SmoothedState,
    pub playing: bool,
    /// Seconds since the mode was activated.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
}

impl<'a> FrameInput<'a> {
    /// Smoothed energies, sanitised.
    pub fn energies(&self) -> BandEnergies {
        self.smoothed.energies().sanitized()
    }

    pub fn heartbeat(&self) -> f32 {
        finite_or(self.smoothed.heartbeat_intensity, 0.0).clamp(0.0, 1.0)
    }
}

/// Clamps into `[min, max]`, substituting `fallback` for NaN or infinity.
pub(crate) fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

pub(crate) fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;

    /// Owns the pieces a [`FrameInput`] borrows.
    pub(crate) struct Fixture {
        pub frame: EnergyFrame,
        pub smoothed: SmoothedState,
        pub playing: bool,
    }

    impl Fixture {
        pub fn silent() -> Self {
            Self {
                frame: EnergyFrame::silent(256, 64, 0.0, 0),
                smoothed: SmoothedState::zeroed(16),
                playing: false,
            }
        }

        pub fn loud(level: f32) -> Self {
            let mut fixture = Self::silent();
            fixture.set_level(level);
            fixture.playing = true;
            fixture
        }

        pub fn set_level(&mut self, level: f32) {
            self.frame.overall = level;
            self.frame.bass = level;
            self.frame.mid = level;
            self.frame.high = level;
            self.frame.spectrum = vec![level; 64].into();
            self.smoothed.overall = level;
            self.smoothed.bass = level;
            self.smoothed.mid = level;
            self.smoothed.high = level;
        }

        pub fn set_waveform(&mut self, f: impl Fn(usize) -> f32) {
            let waveform: Vec<f32> = (0..256).map(f).collect();
            self.frame.waveform = Arc::from(waveform);
        }

        /// Records the current frame in the history rings the way a beat
        /// engine tick does.
        pub fn tick(&mut self) {
            let energies = self.smoothed.energies();
            self.smoothed.energy_history.push(energies);
            self.smoothed.waveform_history.push(self.frame.waveform.clone());
        }

        pub fn input(&self, time: f32, dt: f32) -> FrameInput<'_> {
            FrameInput {
                frame: &self.frame,
                smoothed: &self.smoothed,
                playing: self.playing,
                time,
                dt,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;

    #[test]
    fn parses_mode_names_leniently() {
        assert_eq!("bar-meter".parse::<ModeKind>().unwrap(), ModeKind::BarMeter);
        assert_eq!("Starfield".parse::<ModeKind>().unwrap(), ModeKind::Starfield);
        let err = "laser_show".parse::<ModeKind>().unwrap_err();
        assert!(format!("{err}").contains("laser_show"));
    }

    #[test]
    fn baseline_needs_no_capabilities() {
        assert!(ModeKind::baseline().required_capabilities().is_empty());
        for kind in ModeKind::ALL {
            assert_eq!(kind.to_string(), kind.name());
        }
    }

    #[test]
    fn config_replacement_touches_one_mode() {
        let set = ModeConfigSet::default();
        let helix = HelixConfig {
            turns: 5.0,
            ..Default::default()
        };
        let next = set.with(ModeConfig::Helix(helix.clone()));

        assert_eq!(next.helix, helix);
        assert_eq!(next.blob, set.blob);
        assert_eq!(next.get(ModeKind::Helix).kind(), ModeKind::Helix);
    }

    #[test]
    fn every_mode_renders_its_own_parameters() {
        let configs = ModeConfigSet::default();
        let fixture = Fixture::loud(0.5);
        for kind in ModeKind::ALL {
            let mut runtime = ModeRuntimeState::fresh(kind, &configs);
            assert_eq!(runtime.kind(), kind);
            let params = runtime.render(&configs, &fixture.input(0.1, 1.0 / 60.0));
            assert_eq!(params.kind(), kind);
            assert!(params.is_finite(), "{kind} produced non-finite output");
        }
    }
}
