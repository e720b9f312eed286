//! Render-side value types and the host surface boundary.
//!
//! The engine never draws. It hands a [`RenderParameters`] value per frame
//! to whatever implements [`RenderSurface`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::BandEnergies,
    modes::{
        bars::BarFrame, blob::BlobFrame, bubbles::BubbleFrame, helix::HelixFrame,
        oscilloscope::ScopeFrame, ribbon::RibbonFrame, starfield::StarfieldFrame,
    },
    ModeKind, Result,
};

/// Linear RGBA colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Clamps every component into `[0, 1]`, mapping NaN to zero.
    pub fn clamped(self) -> Self {
        let c = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self::new(c(self.r), c(self.g), c(self.b), c(self.a))
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }.clamped()
    }

    /// Scales the colour channels, leaving alpha alone.
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor, self.a).clamped()
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
        .clamped()
    }

    /// Hue in `[0, 1)`, saturation and value in `[0, 1]`.
    pub fn to_hsv(self) -> (f32, f32, f32) {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;

        let hue = if delta <= f32::EPSILON {
            0.0
        } else if max == self.r {
            ((self.g - self.b) / delta).rem_euclid(6.0) / 6.0
        } else if max == self.g {
            ((self.b - self.r) / delta + 2.0) / 6.0
        } else {
            ((self.r - self.g) / delta + 4.0) / 6.0
        };
        let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
        (hue.rem_euclid(1.0), saturation, max)
    }

    pub fn from_hsv(hue: f32, saturation: f32, value: f32, alpha: f32) -> Self {
        let hue = hue.rem_euclid(1.0) * 6.0;
        let saturation = saturation.clamp(0.0, 1.0);
        let value = value.clamp(0.0, 1.0);
        let c = value * saturation;
        let x = c * (1.0 - (hue % 2.0 - 1.0).abs());
        let m = value - c;

        let (r, g, b) = match hue as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        Self::new(r + m, g + m, b + m, alpha).clamped()
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Mode-specific geometry for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "shape", rename_all = "snake_case")]
pub enum ModeParameters {
    BarMeter(BarFrame),
    Oscilloscope(ScopeFrame),
    SineRibbon(RibbonFrame),
    Blob(BlobFrame),
    BubbleField(BubbleFrame),
    Helix(HelixFrame),
    Starfield(StarfieldFrame),
}

impl ModeParameters {
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

    /// Visits every output colour, used by the rainbow post-process.
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        match self {
            Self::BarMeter(frame) => frame.for_each_colour_mut(f),
            Self::Oscilloscope(frame) => frame.for_each_colour_mut(f),
            Self::SineRibbon(frame) => frame.for_each_colour_mut(f),
            Self::Blob(frame) => frame.for_each_colour_mut(f),
            Self::BubbleField(frame) => frame.for_each_colour_mut(f),
            Self::Helix(frame) => frame.for_each_colour_mut(f),
            Self::Starfield(frame) => frame.for_each_colour_mut(f),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Self::BarMeter(frame) => frame.is_finite(),
            Self::Oscilloscope(frame) => frame.is_finite(),
            Self::SineRibbon(frame) => frame.is_finite(),
            Self::Blob(frame) => frame.is_finite(),
            Self::BubbleField(frame) => frame.is_finite(),
            Self::Helix(frame) => frame.is_finite(),
            Self::Starfield(frame) => frame.is_finite(),
        }
    }
}

/// Everything the host needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParameters {
    pub mode: ModeKind,
    /// Seconds since the active mode was activated.
    pub mode_time: f32,
    /// Analysis snapshot sequence the frame was computed from.
    pub source_sequence: u64,
    /// Smoothed energies the frame was computed from.
    pub energies: BandEnergies,
    pub heartbeat: f32,
    /// Rainbow phase applied to the colours, when the cycle is enabled.
    pub rainbow_phase: Option<f32>,
    pub shape: ModeParameters,
}

impl RenderParameters {
    pub fn for_each_colour_mut(&mut self, f: &mut dyn FnMut(&mut Rgba)) {
        self.shape.for_each_colour_mut(f);
    }

    /// True when no scalar in the frame is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.mode_time.is_finite()
            && self.heartbeat.is_finite()
            && [self.energies.overall, self.energies.bass, self.energies.mid, self.energies.high]
                .iter()
                .all(|v| v.is_finite())
            && self.rainbow_phase.map(f32::is_finite).unwrap_or(true)
            && self.shape.is_finite()
    }
}

/// Optional rendering features a mode may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ShaderPrograms,
    AntialiasedLines,
    AlphaBlending,
    FloatTextures,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ShaderPrograms,
        Capability::AntialiasedLines,
        Capability::AlphaBlending,
        Capability::FloatTextures,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::ShaderPrograms => "shader_programs",
            Capability::AntialiasedLines => "antialiased_lines",
            Capability::AlphaBlending => "alpha_blending",
            Capability::FloatTextures => "float_textures",
        }
    }
}

impl std::str::FromStr for Capability {
    type Err = crate::OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|capability| capability.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::OverlayError::msg(format!("unknown capability `{s}`")))
    }
}

/// Answers "can this feature be enabled here?" for mode activation.
pub trait CapabilityProbe: Send + Sync {
    fn supports(&self, capability: Capability) -> bool;
}

impl<F> CapabilityProbe for F
where
    F: Fn(Capability) -> bool + Send + Sync,
{
    fn supports(&self, capability: Capability) -> bool {
        self(capability)
    }
}

/// The host drawing surface.
pub trait RenderSurface: CapabilityProbe {
    fn draw(&mut self, params: &RenderParameters) -> Result<()>;
}

/// Surface with no window behind it: it records drawn frames and answers
/// capability queries from a fixed set.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    supported: HashSet<Capability>,
    frames_drawn: u64,
    last_frame: Option<RenderParameters>,
}

impl HeadlessSurface {
    /// A surface supporting every capability.
    pub fn new() -> Self {
        Self::with_capabilities(Capability::ALL)
    }

    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            supported: capabilities.into_iter().collect(),
            frames_drawn: 0,
            last_frame: None,
        }
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.supported.remove(&capability);
        self
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn last_frame(&self) -> Option<&RenderParameters> {
        self.last_frame.as_ref()
    }

    /// Snapshot of the supported set, usable as a standalone probe.
    pub fn probe(&self) -> impl CapabilityProbe + 'static {
        let supported = self.supported.clone();
        move |capability: Capability| supported.contains(&capability)
    }
}

impl CapabilityProbe for HeadlessSurface {
    fn supports(&self, capability: Capability) -> bool {
        self.supported.contains(&capability)
    }
}

impl RenderSurface for HeadlessSurface {
    fn draw(&mut self, params: &RenderParameters) -> Result<()> {
        if !params.is_finite() {
            return Err(crate::OverlayError::InvalidInput(
                "render parameters contain non-finite values",
            ));
        }
        self.frames_drawn += 1;
        self.last_frame = Some(params.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_round_trip_preserves_colour() {
        let colour = Rgba::new(0.2, 0.6, 0.9, 0.5);
        let (h, s, v) = colour.to_hsv();
        let back = Rgba::from_hsv(h, s, v, colour.a);

        assert!((back.r - colour.r).abs() < 1e-4);
        assert!((back.g - colour.g).abs() < 1e-4);
        assert!((back.b - colour.b).abs() < 1e-4);
        assert_eq!(back.a, 0.5);
    }

    #[test]
    fn grey_has_zero_saturation() {
        let (_, s, v) = Rgba::rgb(0.5, 0.5, 0.5).to_hsv();
        assert_eq!(s, 0.0);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clamped_removes_nan() {
        let colour = Rgba::new(f32::NAN, 2.0, -1.0, 0.5).clamped();
        assert_eq!(colour, Rgba::new(0.0, 1.0, 0.0, 0.5));
    }

    #[test]
    fn headless_surface_answers_from_its_set() {
        let surface = HeadlessSurface::new().without(Capability::ShaderPrograms);
        assert!(!surface.supports(Capability::ShaderPrograms));
        assert!(surface.supports(Capability::AntialiasedLines));

        let probe = surface.probe();
        assert!(!probe.supports(Capability::ShaderPrograms));
    }

    #[test]
    fn parses_capability_names() {
        let capability: Capability = "Float_Textures".parse().unwrap();
        assert_eq!(capability, Capability::FloatTextures);
        assert!("warp_drive".parse::<Capability>().is_err());
    }
}
