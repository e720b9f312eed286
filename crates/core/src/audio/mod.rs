//! Analysis context: turns captured blocks into published snapshots.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::{
    telemetry::{Telemetry, TelemetryEvent},
    BeatEngine, BridgeWriter, EnergyExtractor, EngineConfig, OverlayError, PublishedState, ResetSignal, Result,
};

/// One block of decoded samples from the capture facility.
#[derive(Debug, Clone, Default)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    /// Whether the capture facility reports active playback.
    pub playing: bool,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, playing: bool) -> Self {
        Self { samples, playing }
    }
}

/// Extractor, beat engine and bridge writer, driven one block at a time.
#[derive(Debug)]
pub struct AnalysisPipeline {
    extractor: EnergyExtractor,
    beat: BeatEngine,
    writer: BridgeWriter,
    reset: ResetSignal,
    applied_epoch: u64,
    telemetry: Telemetry,
    blocks: u64,
    log_every: u64,
}

impl AnalysisPipeline {
    pub fn new(config: &EngineConfig, writer: BridgeWriter, reset: ResetSignal, telemetry: Telemetry) -> Self {
        let block_duration = config.block_duration();
        let log_every = (1.0 / block_duration.max(1e-3)).round().max(1.0) as u64;
        Self {
            extractor: EnergyExtractor::new(&config.audio, config.bands.clone()),
            beat: BeatEngine::new(config.beat.clone(), block_duration),
            writer,
            reset,
            applied_epoch: 0,
            telemetry,
            blocks: 0,
            log_every,
        }
    }

    /// Analyses one block and publishes the result. Returns the publication
    /// sequence number.
    pub fn process_block(&mut self, block: &AudioBlock) -> u64 {
        let epoch = self.reset.epoch();
        if epoch != self.applied_epoch {
            self.beat.reset_smoothing_state();
            self.applied_epoch = epoch;
        }

        let frame = self.extractor.process_block(&block.samples);
        let tick = self.beat.update(&frame);
        if tick.transient {
            self.telemetry.emit(TelemetryEvent::Heartbeat {
                timestamp: frame.timestamp,
                bass: frame.bass,
            });
        }

        self.blocks += 1;
        if self.blocks % self.log_every == 0 {
            let state = self.beat.state();
            debug!(
                blocks = self.blocks,
                overall = state.overall,
                bass = state.bass,
                transients = state.transient_count,
                playing = block.playing,
                "analysis running"
            );
        }

        self.writer.publish(PublishedState {
            frame,
            smoothed: self.beat.state().clone(),
            playing: block.playing,
            reset_epoch: epoch,
            sequence: 0,
        })
    }

    pub fn beat(&self) -> &BeatEngine {
        &self.beat
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

/// The analysis pipeline running on its own thread.
#[derive(Debug)]
pub struct AnalysisThread {
    handle: Option<JoinHandle<AnalysisPipeline>>,
    shutdown: Arc<AtomicBool>,
}

impl AnalysisThread {
    /// Starts consuming `source`. Without a capture source this reports
    /// [`OverlayError::CaptureUnavailable`] once; the bridge keeps its idle
    /// snapshot and rendering carries on.
    pub fn spawn(
        mut pipeline: AnalysisPipeline,
        source: Option<Receiver<AudioBlock>>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let Some(source) = source else {
            let reason = "no audio capture source".to_string();
            warn!(%reason, "analysis not started");
            pipeline
                .telemetry
                .emit(TelemetryEvent::CaptureUnavailable { reason: reason.clone() });
            return Err(OverlayError::CaptureUnavailable(reason));
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let poll_interval = poll_interval.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("overlay-analysis".into())
            .spawn(move || {
                info!("analysis thread started");
                while !flag.load(Ordering::Acquire) {
                    match source.recv_timeout(poll_interval) {
                        Ok(block) => {
                            pipeline.process_block(&block);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            info!("capture source closed");
                            break;
                        }
                    }
                }
                info!(blocks = pipeline.blocks_processed(), "analysis thread stopped");
                pipeline
            })?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Signals the thread and waits for it, returning the pipeline. Returns
    /// `None` when already stopped or when the thread panicked.
    pub fn stop(&mut self) -> Option<AnalysisPipeline> {
        self.shutdown.store(true, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(pipeline) => Some(pipeline),
            Err(_) => {
                warn!("analysis thread panicked");
                None
            }
        }
    }
}

impl Drop for AnalysisThread {
    fn drop(&mut self) {
        self.stop();
    }
}
