//! Mode registry and render dispatcher.
//!
//! Owns the active mode, capability probing and the per-session demotion
//! set. Every switch bumps the shared [`ResetSignal`] exactly once, drops the
//! outgoing runtime state and builds the incoming one from scratch. Until the
//! analysis side publishes a snapshot under the new reset epoch, frames are
//! computed from a zeroed [`SmoothedState`].

use std::{collections::HashSet, sync::Arc};

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::{
    modes::{FrameInput, ModeConfig, ModeConfigSet, ModeKind, ModeRuntimeState},
    render::{CapabilityProbe, RenderParameters},
    telemetry::{Telemetry, TelemetryEvent},
    PublishedState, ResetSignal, SmoothedState,
};

/// Lock-free store of per-mode configuration. Updates replace the whole
/// set, so a reader never sees half of a change.
#[derive(Debug, Clone)]
pub struct ModeConfigStore {
    inner: Arc<ArcSwap<ModeConfigSet>>,
}

impl ModeConfigStore {
    pub fn new(configs: ModeConfigSet) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(configs)),
        }
    }

    pub fn load(&self) -> Arc<ModeConfigSet> {
        self.inner.load_full()
    }

    /// Replaces one mode's configuration.
    pub fn replace(&self, config: ModeConfig) {
        self.inner.rcu(|current| current.with(config.clone()));
    }

    pub fn replace_all(&self, configs: ModeConfigSet) {
        self.inner.store(Arc::new(configs));
    }
}

impl Default for ModeConfigStore {
    fn default() -> Self {
        Self::new(ModeConfigSet::default())
    }
}

#[derive(Debug)]
struct ActiveMode {
    kind: ModeKind,
    requested: ModeKind,
    runtime: ModeRuntimeState,
    /// Snapshots computed before this epoch still carry the previous
    /// mode's smoothing.
    reset_epoch: u64,
    elapsed: f32,
}

impl ActiveMode {
    fn start(
        kind: ModeKind,
        requested: ModeKind,
        from: Option<ModeKind>,
        configs: &ModeConfigSet,
        reset: &ResetSignal,
        telemetry: &Telemetry,
    ) -> Self {
        let reset_epoch = reset.request();
        info!(%kind, %requested, from = ?from, reset_epoch, "mode activated");
        telemetry.emit(TelemetryEvent::ModeSwitched {
            from,
            to: kind,
            requested,
        });
        Self {
            kind,
            requested,
            runtime: ModeRuntimeState::fresh(kind, configs),
            reset_epoch,
            elapsed: 0.0,
        }
    }
}

pub struct ModeRegistry {
    probe: Arc<dyn CapabilityProbe>,
    configs: ModeConfigStore,
    reset: ResetSignal,
    telemetry: Telemetry,
    active: Option<ActiveMode>,
    demoted: HashSet<ModeKind>,
}

impl ModeRegistry {
    pub fn new(
        probe: Arc<dyn CapabilityProbe>,
        configs: ModeConfigStore,
        reset: ResetSignal,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            probe,
            configs,
            reset,
            telemetry,
            active: None,
            demoted: HashSet::new(),
        }
    }

    /// The running mode, `None` while uninitialised.
    pub fn active_mode(&self) -> Option<ModeKind> {
        self.active.as_ref().map(|active| active.kind)
    }

    /// What the user asked for when the active mode was activated.
    pub fn requested_mode(&self) -> Option<ModeKind> {
        self.active.as_ref().map(|active| active.requested)
    }

    pub fn is_demoted(&self, kind: ModeKind) -> bool {
        self.demoted.contains(&kind)
    }

    pub fn demoted(&self) -> impl Iterator<Item = ModeKind> + '_ {
        self.demoted.iter().copied()
    }

    pub fn configs(&self) -> &ModeConfigStore {
        &self.configs
    }

    /// Replaces one mode's configuration; the running runtime state is kept.
    pub fn update_config(&self, config: ModeConfig) {
        debug!(mode = %config.kind(), "mode configuration replaced");
        self.configs.replace(config);
    }

    /// Activates `requested`, or the baseline when it is demoted or fails
    /// its capability probe. Returns the mode actually running. Requesting
    /// the running mode does nothing.
    pub fn activate(&mut self, requested: ModeKind) -> ModeKind {
        let resolved = self.resolve(requested);
        let from = self.active_mode();
        if from == Some(resolved) {
            if let Some(active) = self.active.as_mut() {
                active.requested = requested;
            }
            return resolved;
        }

        // The outgoing runtime is dropped before the new one is built.
        self.active = None;
        let configs = self.configs.load();
        self.active = Some(ActiveMode::start(
            resolved,
            requested,
            from,
            &configs,
            &self.reset,
            &self.telemetry,
        ));
        resolved
    }

    /// Tears the active mode down synchronously. Does not touch the analysis
    /// side.
    pub fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            info!(mode = %active.kind, "mode deactivated");
        }
    }

    /// Computes one frame for the active mode, activating the baseline
    /// first when nothing is active yet.
    pub fn render_frame(&mut self, state: &PublishedState, dt: f32) -> RenderParameters {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let configs = self.configs.load();
        let active = self.active.get_or_insert_with(|| {
            let baseline = ModeKind::baseline();
            ActiveMode::start(baseline, baseline, None, &configs, &self.reset, &self.telemetry)
        });
        active.elapsed += dt;

        let zeroed;
        let smoothed = if state.reset_epoch < active.reset_epoch {
            zeroed = SmoothedState::zeroed(state.smoothed.history_depth());
            &zeroed
        } else {
            &state.smoothed
        };

        let input = FrameInput {
            frame: &state.frame,
            smoothed,
            playing: state.playing,
            time: active.elapsed,
            dt,
        };
        let shape = active.runtime.render(&configs, &input);

        RenderParameters {
            mode: active.kind,
            mode_time: active.elapsed,
            source_sequence: state.sequence,
            energies: input.energies(),
            heartbeat: input.heartbeat(),
            rainbow_phase: None,
            shape,
        }
    }

    fn resolve(&mut self, requested: ModeKind) -> ModeKind {
        let baseline = ModeKind::baseline();
        if requested == baseline {
            return baseline;
        }
        if self.demoted.contains(&requested) {
            debug!(%requested, "mode is demoted for this session");
            return baseline;
        }

        let missing = requested
            .required_capabilities()
            .iter()
            .copied()
            .find(|capability| !self.probe.supports(*capability));
        match missing {
            None => requested,
            Some(capability) => {
                warn!(
                    mode = %requested,
                    capability = capability.name(),
                    "capability unavailable, demoting mode for this session"
                );
                self.demoted.insert(requested);
                self.telemetry.emit(TelemetryEvent::CapabilityFallback {
                    mode: requested,
                    fallback: baseline,
                });
                baseline
            }
        }
    }
}

impl std::fmt::Debug for ModeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeRegistry")
            .field("active", &self.active_mode())
            .field("demoted", &self.demoted)
            .finish()
    }
}
