use std::{f32::consts::PI, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use visemesync_core::{
    frame_duration, LipSyncConfig, LipSyncError, LipSyncSession, StreamTap, VisemeTrack,
};

fn main() -> visemesync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            config,
            seconds,
            fps,
        } => run_demo(load_config(config.as_ref())?, seconds, fps),
        Commands::Precompute {
            input,
            output,
            config,
            fps,
        } => run_precompute(&input, &output, load_config(config.as_ref())?, fps),
        Commands::Config => {
            println!("{}", LipSyncConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> visemesync_core::Result<LipSyncConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            LipSyncConfig::from_path(path)
        }
        None => Ok(LipSyncConfig::default()),
    }
}

fn run_demo(config: LipSyncConfig, seconds: f32, fps: u32) -> visemesync_core::Result<()> {
    tracing::info!(seconds, fps, "starting lip-sync demo");

    let fps = fps.max(1);
    let hop = (config.sample_rate / fps).max(1) as usize;
    let tap = Arc::new(StreamTap::new(config.sample_rate, config.window_size * 4));
    let mut voice = SyntheticVoice::new(config.sample_rate);
    let mut session = LipSyncSession::new(config)?;

    tap.play()?;
    session.connect(&tap);

    let elapsed = frame_duration(fps);
    let total_frames = (seconds.max(0.0) * fps as f32).round() as u32;
    let mut block = vec![0.0; hop];
    for frame in 0..total_frames {
        voice.fill(&mut block);
        tap.push_samples(&block)?;
        let weights = session.advance(elapsed);

        if let Some((viseme, weight)) = weights.dominant() {
            tracing::info!(frame, viseme, weight, "dominant viseme");
        }
    }

    tap.finish()?;
    let weights = session.advance(elapsed);
    tracing::info!(state = ?session.state(), ?weights, "demo finished");
    Ok(())
}

fn run_precompute(
    input: &PathBuf,
    output: &PathBuf,
    config: LipSyncConfig,
    fps: u32,
) -> visemesync_core::Result<()> {
    tracing::info!(?input, ?output, "running precompute pipeline");

    let samples = read_f32_pcm(input)?;
    let track = VisemeTrack::render(&config, &samples, fps)?;
    track.write_json(output)?;

    tracing::info!(frames = track.len(), "viseme track written");
    Ok(())
}

/// Reads headerless little-endian `f32` mono PCM.
fn read_f32_pcm(path: &PathBuf) -> visemesync_core::Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(LipSyncError::msg(format!(
            "{} is not raw f32 PCM: {} bytes is not a multiple of 4",
            path.display(),
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Alternates vowel-like tones, hiss and pauses so every stage of the engine
/// gets exercised without an audio file.
struct SyntheticVoice {
    sample_rate: f32,
    position: usize,
    noise: u32,
}

impl SyntheticVoice {
    const SEGMENT_SECONDS: f32 = 0.25;

    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            position: 0,
            noise: 0x1234_5678,
        }
    }

    fn fill(&mut self, block: &mut [f32]) {
        for slot in block.iter_mut() {
            let t = self.position as f32 / self.sample_rate;
            let segment = (t / Self::SEGMENT_SECONDS) as usize % 4;
            *slot = match segment {
                0 => 0.3 * tone(t, 220.0) + 0.2 * tone(t, 800.0) + 0.1 * tone(t, 1_200.0),
                1 => 0.3 * tone(t, 180.0) + 0.15 * tone(t, 350.0) + 0.05 * tone(t, 2_300.0),
                2 => 0.2 * self.next_noise(),
                _ => 0.0,
            };
            self.position += 1;
        }
    }

    fn next_noise(&mut self) -> f32 {
        self.noise = self
            .noise
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        (self.noise >> 8) as f32 / (1u32 << 23) as f32 - 1.0
    }
}

fn tone(t: f32, freq_hz: f32) -> f32 {
    (2.0 * PI * freq_hz * t).sin()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-driven viseme lip-sync engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a session with a synthetic voice and log the dominant viseme.
    Demo {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Length of the synthetic clip.
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
        /// Animation frames per second.
        #[arg(long, default_value_t = 60)]
        fps: u32,
    },
    /// Render a viseme track for a raw little-endian f32 mono PCM file.
    Precompute {
        /// Path to the PCM file that should be analysed.
        input: PathBuf,
        /// Output path for the generated JSON track.
        output: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Track frame rate.
        #[arg(long, default_value_t = 60)]
        fps: u32,
    },
    /// Print the default configuration as JSON.
    Config,
}
