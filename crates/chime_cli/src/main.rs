//! Chime - command-line sound player
//!
//! Plays a 16-bit PCM WAVE file on the default output device through the
//! shared-mode feed engine, once or repeatedly.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chime_core::{EngineConfig, Event, FeedEngine, PeriodPreference};

/// Command-line arguments for chime
#[derive(Parser, Debug)]
#[command(name = "chime")]
#[command(about = "Low-latency WAVE player for the default output device")]
#[command(version)]
struct Args {
    /// 16-bit PCM WAVE file to play
    file: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long, env = "CHIME_CONFIG")]
    config: Option<PathBuf>,

    /// Number of times to play the file
    #[arg(short, long, default_value_t = 1)]
    repeat: u32,

    /// Silence between repeats, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    gap_ms: u64,

    /// Engine period to request (overrides the configuration file)
    #[arg(short, long, value_enum)]
    period: Option<PeriodArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PeriodArg {
    Default,
    Minimum,
}

impl From<PeriodArg> for PeriodPreference {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Default => PeriodPreference::Default,
            PeriodArg::Minimum => PeriodPreference::Minimum,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime=info,chime_core=info,chime_platform=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::load_or_default(),
    };
    if let Some(period) = args.period {
        config.period = period.into();
    }

    let mut engine = FeedEngine::open(config).context("Failed to open output device")?;
    info!(
        "Output: {} (buffer {:.1} ms)",
        engine.format(),
        engine.period().buffer_ms(engine.format().sample_rate)
    );

    let sound = engine
        .load_sound(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    if sound.is_empty() {
        warn!("{} has no audio data", args.file.display());
    }

    engine.start().context("Failed to start playback")?;

    // Tail still in the device buffer after the queue drains
    let tail = Duration::from_secs_f32(engine.period().buffer_ms(engine.format().sample_rate) / 1000.0);
    let gap = Duration::from_millis(args.gap_ms);

    for round in 1..=args.repeat {
        info!("Playing {} ({}/{})", args.file.display(), round, args.repeat);
        engine.queue_audio(sound.clone());
        wait_for_drain(&engine)?;
        if round < args.repeat {
            thread::sleep(gap);
        }
    }
    thread::sleep(tail);

    engine.stop().context("Failed to stop playback")?;
    engine.destroy().context("Failed to release output device")?;
    info!("Done");
    Ok(())
}

/// Block until the queued sound has been handed to the device
fn wait_for_drain(engine: &FeedEngine) -> Result<()> {
    let poll = Duration::from_millis(5);
    let started = Instant::now();

    while engine.remaining() > 0 {
        while let Some(event) = engine.try_recv_event() {
            match event {
                Event::Error { message } => bail!("Playback failed: {}", message),
                Event::Closed => bail!("Output device closed"),
                other => debug!("Engine event: {:?}", other),
            }
        }
        thread::sleep(poll);
    }

    debug!("Queue drained in {:?}", started.elapsed());
    Ok(())
}
