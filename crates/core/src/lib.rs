//! Core library for the spectrum overlay.
//!
//! Two contexts cooperate. The analysis context turns captured audio blocks
//! into energies and smoothed, transient-aware state, and publishes each
//! snapshot through a lock-free bridge. The render context reads the latest
//! snapshot on its own cadence, runs the active visualization mode and
//! applies the rainbow cycle. Each module owns one of those pieces.

pub mod analysis;
pub mod audio;
pub mod beat;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod modes;
pub mod rainbow;
pub mod registry;
pub mod render;
pub mod telemetry;
pub mod timeline;

pub use analysis::{BandEnergies, EnergyExtractor, EnergyFrame};
pub use audio::{AnalysisPipeline, AnalysisThread, AudioBlock};
pub use beat::{BeatEngine, BeatTick, ResetSignal, SmoothedState};
pub use bridge::{state_bridge, BridgeReader, BridgeWriter, PublishedState};
pub use config::{AudioConfig, BandConfig, BeatConfig, EngineConfig, SmoothingCurve};
pub use engine::{EngineParts, OverlayEngine};
pub use error::{OverlayError, Result};
pub use history::{RingBuffer, RollingAverage};
pub use modes::{FrameInput, ModeConfig, ModeConfigSet, ModeKind, ModeRuntimeState};
pub use rainbow::{RainbowCycle, RainbowSettings};
pub use registry::{ModeConfigStore, ModeRegistry};
pub use render::{
    Capability, CapabilityProbe, HeadlessSurface, ModeParameters, RenderParameters, RenderSurface, Rgba,
};
pub use telemetry::{telemetry_channel, Telemetry, TelemetryEvent};
pub use timeline::{FrameClock, ModeSchedule, ScheduledSwitch};
