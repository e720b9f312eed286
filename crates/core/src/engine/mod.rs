//! Render-side facade wiring the registry, the rainbow cycle and the bridge.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::info;

use crate::{
    audio::AnalysisPipeline,
    modes::{ModeConfig, ModeKind},
    rainbow::{RainbowCycle, RainbowSettings},
    registry::{ModeConfigStore, ModeRegistry},
    render::{CapabilityProbe, RenderParameters, RenderSurface},
    state_bridge,
    telemetry::{telemetry_channel, Telemetry, TelemetryEvent},
    timeline::FrameClock,
    BridgeReader, EngineConfig, PublishedState, ResetSignal, Result,
};

/// Everything a host needs: the render-side engine, the analysis pipeline to
/// run on the capture side, and the telemetry receiver.
pub struct EngineParts {
    pub engine: OverlayEngine,
    pub pipeline: AnalysisPipeline,
    pub telemetry: Receiver<TelemetryEvent>,
}

impl std::fmt::Debug for EngineParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineParts")
            .field("engine", &self.engine)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct OverlayEngine {
    initial_mode: ModeKind,
    registry: ModeRegistry,
    rainbow: RainbowCycle,
    reader: BridgeReader,
    clock: FrameClock,
    telemetry: Telemetry,
}

impl OverlayEngine {
    pub fn new(
        config: &EngineConfig,
        reader: BridgeReader,
        reset: ResetSignal,
        probe: Arc<dyn CapabilityProbe>,
        telemetry: Telemetry,
    ) -> Self {
        let configs = ModeConfigStore::new(config.modes.clone());
        Self {
            initial_mode: config.initial_mode,
            registry: ModeRegistry::new(probe, configs, reset, telemetry.clone()),
            rainbow: RainbowCycle::new(config.rainbow),
            reader,
            clock: FrameClock::new(),
            telemetry,
        }
    }

    /// Builds a connected engine and analysis pipeline sharing one bridge,
    /// one reset signal and one telemetry channel.
    pub fn build(config: &EngineConfig, probe: Arc<dyn CapabilityProbe>) -> EngineParts {
        let (writer, reader) = state_bridge(PublishedState::idle(config));
        let reset = ResetSignal::new();
        let (telemetry, events) = telemetry_channel(config.telemetry_capacity);

        let pipeline = AnalysisPipeline::new(config, writer, reset.clone(), telemetry.clone());
        let engine = Self::new(config, reader, reset, probe, telemetry);
        EngineParts {
            engine,
            pipeline,
            telemetry: events,
        }
    }

    /// Computes the next frame from the latest published snapshot. Never
    /// blocks on the analysis side.
    pub fn render_frame(&mut self, dt: f32) -> RenderParameters {
        let dt = self.clock.advance(dt);
        self.rainbow.advance(dt);
        if self.registry.active_mode().is_none() {
            self.registry.activate(self.initial_mode);
        }

        let state = self.reader.latest();
        let mut params = self.registry.render_frame(&state, dt);
        self.rainbow.apply(&mut params);
        params
    }

    /// Renders a frame and hands it to `surface`.
    pub fn draw(&mut self, surface: &mut dyn RenderSurface, dt: f32) -> Result<RenderParameters> {
        let params = self.render_frame(dt);
        surface.draw(&params)?;
        Ok(params)
    }

    /// Switches modes; returns the mode actually running after fallback.
    pub fn switch_mode(&mut self, mode: ModeKind) -> ModeKind {
        self.registry.activate(mode)
    }

    pub fn update_config(&self, config: ModeConfig) {
        self.registry.update_config(config);
    }

    pub fn set_rainbow(&mut self, settings: RainbowSettings) {
        info!(enabled = settings.enabled, speed = settings.speed(), "rainbow settings changed");
        self.rainbow.set_settings(settings);
    }

    pub fn rainbow_phase(&self) -> f32 {
        self.rainbow.phase()
    }

    pub fn active_mode(&self) -> Option<ModeKind> {
        self.registry.active_mode()
    }

    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Tears the active mode down. Independent of the analysis thread, which
    /// the host stops separately.
    pub fn shutdown(&mut self) {
        self.registry.deactivate();
        info!(
            frames = self.clock.frames(),
            elapsed = self.clock.elapsed(),
            dropped_events = self.telemetry.dropped(),
            "engine shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::AudioBlock,
        render::{Capability, HeadlessSurface},
    };

    fn parts(config: &EngineConfig) -> EngineParts {
        OverlayEngine::build(config, Arc::new(HeadlessSurface::new().probe()))
    }

    #[test]
    fn renders_idle_without_any_audio() {
        let mut parts = parts(&EngineConfig::default());
        let params = parts.engine.render_frame(1.0 / 60.0);
        assert_eq!(params.mode, ModeKind::BarMeter);
        assert_eq!(params.source_sequence, 0);
        assert!(params.is_finite());
    }

    #[test]
    fn starts_in_the_configured_mode() {
        let config = EngineConfig {
            initial_mode: ModeKind::Helix,
            ..Default::default()
        };
        let mut parts = parts(&config);
        assert_eq!(parts.engine.render_frame(0.016).mode, ModeKind::Helix);
    }

    #[test]
    fn frames_follow_published_snapshots() {
        let config = EngineConfig::default();
        let mut parts = parts(&config);
        parts
            .pipeline
            .process_block(&AudioBlock::new(vec![0.1; config.audio.block_size], true));
        parts.engine.render_frame(0.016);
        parts
            .pipeline
            .process_block(&AudioBlock::new(vec![0.1; config.audio.block_size], true));

        let params = parts.engine.render_frame(0.016);
        assert_eq!(params.source_sequence, 2);
    }

    #[test]
    fn rainbow_phase_is_recorded_when_enabled() {
        let mut parts = parts(&EngineConfig::default());
        assert_eq!(parts.engine.render_frame(0.05).rainbow_phase, None);

        parts.engine.set_rainbow(RainbowSettings {
            enabled: true,
            speed: 1.0,
        });
        // 0.05 s at the default speed while disabled, then 0.05 s at 1.0.
        let phase = parts.engine.render_frame(0.05).rainbow_phase.unwrap();
        assert!((phase - 0.055).abs() < 1e-5);
    }

    #[test]
    fn draws_to_a_surface() {
        let mut parts = parts(&EngineConfig::default());
        let mut surface = HeadlessSurface::new().without(Capability::FloatTextures);
        parts.engine.draw(&mut surface, 0.016).unwrap();
        parts.engine.draw(&mut surface, 0.016).unwrap();
        assert_eq!(surface.frames_drawn(), 2);
        assert_eq!(surface.last_frame().map(|p| p.mode), Some(ModeKind::BarMeter));
    }

    #[test]
    fn shutdown_clears_the_active_mode() {
        let mut parts = parts(&EngineConfig::default());
        parts.engine.switch_mode(ModeKind::Oscilloscope);
        parts.engine.shutdown();
        assert_eq!(parts.engine.active_mode(), None);
    }
}
