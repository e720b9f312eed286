mod synth;

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, Receiver};
use spectrum_overlay_core::{
    AnalysisThread, Capability, EngineConfig, HeadlessSurface, ModeKind, ModeSchedule, OverlayEngine,
    OverlayError, RenderParameters, Result, TelemetryEvent,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::synth::SyntheticSource;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live(args) => run_live(args),
        Commands::Render(args) => run_render(args),
        Commands::Modes => {
            list_modes();
            Ok(())
        }
        Commands::Config { output } => write_default_config(output.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            info!(?path, "loading configuration");
            EngineConfig::load(path)
        }
        None => Ok(EngineConfig::live_defaults()),
    }
}

fn apply_overrides(config: &mut EngineConfig, mode: Option<&str>, rainbow: bool, rainbow_speed: Option<f32>) -> Result<()> {
    if let Some(mode) = mode {
        config.initial_mode = mode.parse()?;
    }
    if rainbow {
        config.rainbow.enabled = true;
    }
    if let Some(speed) = rainbow_speed {
        config.rainbow.speed = speed;
    }
    Ok(())
}

fn run_live(args: LiveArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args.mode.as_deref(), args.rainbow, args.rainbow_speed)?;

    let mut surface = HeadlessSurface::new();
    for name in &args.unsupported {
        let capability: Capability = name.parse()?;
        surface = surface.without(capability);
    }

    info!(
        seconds = args.seconds,
        fps = args.fps,
        mode = %config.initial_mode,
        "starting live session"
    );

    let parts = OverlayEngine::build(&config, Arc::new(surface.probe()));
    let mut engine = parts.engine;
    let events = parts.telemetry;

    let stop = Arc::new(AtomicBool::new(false));
    let mut producer = None;
    let source = if args.no_capture {
        None
    } else {
        let (sender, receiver) = bounded(8);
        let mut synth = SyntheticSource::new(config.audio.sample_rate, config.audio.block_size, args.tempo);
        let block_time = Duration::from_secs_f32(synth.block_secs());
        let stop = stop.clone();
        producer = Some(
            thread::Builder::new()
                .name("synthetic-capture".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        if sender.send(synth.next_block()).is_err() {
                            break;
                        }
                        thread::sleep(block_time);
                    }
                })?,
        );
        Some(receiver)
    };

    let poll = Duration::from_millis(config.audio.poll_interval_ms.max(1));
    let mut analysis = match AnalysisThread::spawn(parts.pipeline, source, poll) {
        Ok(thread) => Some(thread),
        Err(err @ OverlayError::CaptureUnavailable(_)) => {
            error!(%err, "rendering idle visuals without audio");
            None
        }
        Err(err) => return Err(err),
    };

    let mut schedule = match args.cycle_secs {
        Some(interval) => ModeSchedule::cycle(&ModeKind::ALL, interval),
        None => ModeSchedule::default(),
    };

    let fps = args.fps.clamp(1, 240);
    let frame_time = Duration::from_secs_f64(1.0 / fps as f64);
    let started = Instant::now();
    let mut last = started;
    while started.elapsed().as_secs_f32() < args.seconds {
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;

        if let Some(mode) = schedule.poll(engine.clock()) {
            engine.switch_mode(mode);
        }
        let params = engine.draw(&mut surface, dt)?;
        if surface.frames_drawn() % fps as u64 == 0 {
            log_frame(&params);
        }
        drain_telemetry(&events);

        thread::sleep(frame_time.saturating_sub(now.elapsed()));
    }

    engine.shutdown();
    stop.store(true, Ordering::Release);
    if let Some(analysis) = analysis.as_mut() {
        analysis.stop();
    }
    if let Some(producer) = producer {
        if producer.join().is_err() {
            warn!("capture thread panicked");
        }
    }
    drain_telemetry(&events);
    info!(frames = surface.frames_drawn(), "live session finished");
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args.mode.as_deref(), args.rainbow, None)?;

    let parts = OverlayEngine::build(&config, Arc::new(HeadlessSurface::new().probe()));
    let mut engine = parts.engine;
    let mut pipeline = parts.pipeline;
    let mut synth = SyntheticSource::new(config.audio.sample_rate, config.audio.block_size, args.tempo);

    let fps = args.fps.clamp(1, 240);
    let dt = 1.0 / fps as f32;
    let block_secs = synth.block_secs() as f64;
    let mut audio_time = 0.0f64;

    let mut frames: Vec<RenderParameters> = Vec::with_capacity(args.frames);
    for _ in 0..args.frames {
        // Feed audio up to the frame's render time.
        while audio_time < engine.clock().elapsed() + dt as f64 {
            pipeline.process_block(&synth.next_block());
            audio_time += block_secs;
        }
        frames.push(engine.render_frame(dt));
    }
    drain_telemetry(&parts.telemetry);

    let mut writer = BufWriter::new(File::create(&args.output)?);
    serde_json::to_writer_pretty(&mut writer, &frames)?;
    writer.flush()?;
    info!(frames = frames.len(), output = ?args.output, "offline render written");
    Ok(())
}

fn list_modes() {
    for mode in ModeKind::ALL {
        let needs: Vec<&str> = mode.required_capabilities().iter().map(|c| c.name()).collect();
        let needs = if needs.is_empty() { "-".to_string() } else { needs.join(", ") };
        println!("{:<14} {}", mode.name(), needs);
    }
}

fn write_default_config(output: Option<&Path>) -> Result<()> {
    let json = EngineConfig::default().to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(?path, "default configuration written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn log_frame(params: &RenderParameters) {
    info!(
        mode = %params.mode,
        mode_time = params.mode_time,
        sequence = params.source_sequence,
        rainbow = ?params.rainbow_phase,
        "frame"
    );
}

fn drain_telemetry(events: &Receiver<TelemetryEvent>) {
    for event in events.try_iter() {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "telemetry", "{json}"),
            Err(err) => warn!(%err, "telemetry event not serialisable"),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive spectrum overlay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a timed session against a synthetic capture source.
    Live(LiveArgs),
    /// Render a deterministic frame sequence to a JSON file.
    Render(RenderArgs),
    /// List the visualization modes and the capabilities they need.
    Modes,
    /// Print the default configuration.
    Config {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct LiveArgs {
    /// Configuration file to load.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Mode to start in.
    #[arg(short, long)]
    mode: Option<String>,
    #[arg(long, default_value_t = 10.0)]
    seconds: f32,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    #[arg(long, default_value_t = 124.0)]
    tempo: f32,
    /// Cycle through every mode at this interval, in seconds.
    #[arg(long)]
    cycle_secs: Option<f64>,
    /// Capabilities the simulated surface lacks.
    #[arg(long, value_delimiter = ',')]
    unsupported: Vec<String>,
    #[arg(long)]
    rainbow: bool,
    #[arg(long)]
    rainbow_speed: Option<f32>,
    /// Simulate a missing capture facility.
    #[arg(long)]
    no_capture: bool,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Destination JSON file.
    output: PathBuf,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    mode: Option<String>,
    #[arg(long, default_value_t = 120)]
    frames: usize,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    #[arg(long, default_value_t = 124.0)]
    tempo: f32,
    #[arg(long)]
    rainbow: bool,
}
