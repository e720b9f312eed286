use std::{f32::consts::TAU, sync::Arc, time::Duration};

use crossbeam_channel::bounded;
use proptest::prelude::*;
use spectrum_overlay_core::{
    AnalysisThread, AudioBlock, BeatEngine, Capability, EnergyExtractor, EngineConfig, ModeKind, OverlayEngine,
    OverlayError, TelemetryEvent,
};

fn pulse_block(config: &EngineConfig, index: usize) -> AudioBlock {
    let sr = config.audio.sample_rate as f32;
    let loud = index % 12 < 2;
    let samples = (0..config.audio.block_size)
        .map(|i| {
            let t = (index * config.audio.block_size + i) as f32 / sr;
            let kick = if loud { (TAU * 65.0 * t).sin() * 0.9 } else { 0.0 };
            kick + (TAU * 1_200.0 * t).sin() * 0.1
        })
        .collect();
    AudioBlock::new(samples, true)
}

fn unit(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

#[test]
fn threaded_analysis_feeds_the_render_side() {
    let config = EngineConfig::default();
    let parts = OverlayEngine::build(&config, Arc::new(|_: Capability| true));
    let mut engine = parts.engine;

    let (sender, receiver) = bounded(64);
    let mut analysis =
        AnalysisThread::spawn(parts.pipeline, Some(receiver), Duration::from_millis(5)).expect("spawn analysis");
    assert_eq!(engine.switch_mode(ModeKind::BubbleField), ModeKind::BubbleField);

    for i in 0..48 {
        sender.send(pulse_block(&config, i)).expect("analysis thread alive");
    }
    drop(sender);

    let pipeline = analysis.stop().expect("analysis thread joined");
    assert_eq!(pipeline.blocks_processed(), 48);
    assert!(!analysis.is_running());

    let params = engine.render_frame(1.0 / 60.0);
    assert_eq!(params.source_sequence, 48);
    assert!(params.is_finite());
    assert!(params.energies.overall > 0.0);

    let heartbeats = parts
        .telemetry
        .try_iter()
        .filter(|e| matches!(e, TelemetryEvent::Heartbeat { .. }))
        .count();
    assert!(heartbeats >= 2, "expected repeated transients, saw {heartbeats}");
}

#[test]
fn rendering_continues_without_capture() {
    let config = EngineConfig::default();
    let parts = OverlayEngine::build(&config, Arc::new(|_: Capability| true));
    let mut engine = parts.engine;

    let err = AnalysisThread::spawn(parts.pipeline, None, Duration::from_millis(5)).unwrap_err();
    assert!(matches!(err, OverlayError::CaptureUnavailable(_)));

    for _ in 0..30 {
        let params = engine.render_frame(1.0 / 60.0);
        assert_eq!(params.source_sequence, 0);
        assert!(params.is_finite());
    }
    let unavailable = parts
        .telemetry
        .try_iter()
        .filter(|e| matches!(e, TelemetryEvent::CaptureUnavailable { .. }))
        .count();
    assert_eq!(unavailable, 1);
}

#[test]
fn heartbeat_only_rises_on_transients() {
    let config = EngineConfig::default();
    let mut extractor = EnergyExtractor::new(&config.audio, config.bands.clone());
    let mut beat = BeatEngine::new(config.beat.clone(), config.block_duration());

    let mut previous = beat.state().heartbeat_intensity;
    let mut transients = 0;
    for i in 0..240 {
        let frame = extractor.process_block(&pulse_block(&config, i).samples);
        let tick = beat.update(&frame);
        let heartbeat = beat.state().heartbeat_intensity;
        if tick.transient {
            transients += 1;
            assert_eq!(heartbeat, 1.0);
        } else {
            assert!(heartbeat <= previous, "heartbeat rose from {previous} to {heartbeat} without a transient");
        }
        previous = heartbeat;
    }
    assert!(transients >= 10);
    assert_eq!(beat.state().transient_count, transients);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn energies_stay_in_unit_range(
        blocks in prop::collection::vec(prop::collection::vec(-2.0f32..2.0, 64..2048), 1..8)
    ) {
        let config = EngineConfig::default();
        let mut extractor = EnergyExtractor::new(&config.audio, config.bands.clone());
        let mut beat = BeatEngine::new(config.beat.clone(), config.block_duration());

        for block in &blocks {
            let frame = extractor.process_block(block);
            for value in [frame.overall, frame.bass, frame.mid, frame.high] {
                prop_assert!(unit(value), "frame energy {} out of range", value);
            }
            prop_assert!(frame.spectrum.iter().all(|v| unit(*v)));
            prop_assert!(frame.waveform.iter().all(|v| (-1.0..=1.0).contains(v)));

            beat.update(&frame);
            let state = beat.state();
            for value in [state.overall, state.bass, state.mid, state.high, state.heartbeat_intensity] {
                prop_assert!(unit(value), "smoothed energy {} out of range", value);
            }
        }
    }

    #[test]
    fn empty_and_tiny_blocks_are_silent(len in 0usize..8) {
        let config = EngineConfig::default();
        let mut extractor = EnergyExtractor::new(&config.audio, config.bands.clone());
        let frame = extractor.process_block(&vec![0.0; len]);
        prop_assert_eq!(frame.overall, 0.0);
        prop_assert_eq!(frame.waveform.len(), config.audio.waveform_len());
    }
}
