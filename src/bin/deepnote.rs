use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use deepnote::audio_io::{CpalDevice, OfflineDevice};
use deepnote::device::NullDevice;
use deepnote::{AudioOutput, EngineConfig, SynthesisEngine};

/// CLI for playing or rendering the Deep Note chord
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for the random voice draws; omit for a different chord each run
    #[arg(long)]
    seed: Option<u64>,
    /// Override the number of voices
    #[arg(long)]
    voices: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play live through the default output device
    Play(PlayArgs),
    /// Render one full run to a WAV file
    Render(RenderArgs),
    /// Generate a default config file and exit
    GenerateConfig(ConfigArgs),
}

#[derive(ClapArgs)]
struct PlayArgs {
    /// Emit snapshots as JSON lines instead of the meter display
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Run the snapshot feed without audio output
    #[arg(long, default_value_t = false)]
    no_audio: bool,
}

#[derive(ClapArgs)]
struct RenderArgs {
    /// Output path for the rendered WAV
    #[arg(long, default_value = "deepnote.wav")]
    out: PathBuf,
}

#[derive(ClapArgs)]
struct ConfigArgs {
    /// Output path for the generated configuration
    #[arg(long, default_value = "config.toml")]
    out: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(voices) = cli.voices {
        config.voice_count = voices;
    }

    match cli.command {
        Commands::Play(args) => play(config, cli.seed, args),
        Commands::Render(args) => render(config, cli.seed, args),
        Commands::GenerateConfig(args) => {
            EngineConfig::generate_default(&args.out)?;
            println!("Generated default config at {}", args.out.display());
            Ok(())
        }
    }
}

fn build_engine(
    config: EngineConfig,
    device: Box<dyn AudioOutput>,
    seed: Option<u64>,
) -> Result<SynthesisEngine, Box<dyn std::error::Error>> {
    let engine = match seed {
        Some(seed) => SynthesisEngine::with_seed(config, device, seed)?,
        None => SynthesisEngine::new(config, device)?,
    };
    Ok(engine)
}

fn play(
    config: EngineConfig,
    seed: Option<u64>,
    args: PlayArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let sample_rate = config.sample_rate;
    let device: Box<dyn AudioOutput> = if args.no_audio {
        Box::new(NullDevice::new())
    } else {
        Box::new(CpalDevice::new(sample_rate))
    };
    let engine = build_engine(config, device, seed)?;

    let handle = engine.clone();
    ctrlc::set_handler(move || handle.stop())?;

    engine.start()?;
    while let Some(snapshot) = engine.tick() {
        if args.json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            let mean = snapshot.current_frequencies.iter().sum::<f64>()
                / snapshot.current_frequencies.len() as f64;
            println!(
                "[{:6.2}s/{:5.1}s] {:?} mean {:7.1} Hz",
                snapshot.elapsed_time,
                snapshot.total_duration,
                engine.current_phase(),
                mean
            );
        }
        std::thread::sleep(Duration::from_millis(if args.json { 16 } else { 100 }));
    }
    println!("Done");
    Ok(())
}

fn render(
    config: EngineConfig,
    seed: Option<u64>,
    args: RenderArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let device = OfflineDevice::new(config.sample_rate);
    let renderer = device.renderer();
    let engine = build_engine(config, Box::new(device), seed)?;

    engine.start()?;
    let duration = engine.total_duration();
    let started = std::time::Instant::now();
    renderer.render_to_wav(duration, &args.out)?;
    engine.stop();
    println!(
        "Rendered {:.1}s to {} in {:.2}s",
        duration,
        args.out.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
