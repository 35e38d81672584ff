use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vivaprep::app::{reset_session, run_interview, show_results};
use vivaprep::audio::capture::list_devices;
use vivaprep::cli::{Cli, Commands};
use vivaprep::config::Config;
use vivaprep::speech::synth::{EspeakSynth, SpeechSynth};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        None => {
            let config = load_config(&cli)?;
            run_interview(config, cli.no_speech).await?;
        }
        Some(Commands::Results) => {
            let config = load_config(&cli)?;
            show_results(config).await?;
        }
        Some(Commands::Reset) => {
            reset_session()?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Voices) => {
            list_synth_voices().await?;
        }
    }

    Ok(())
}

/// Route diagnostics to stderr so they never mix into the interview prompt.
/// RUST_LOG overrides the verbosity flags.
fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vivaprep={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/vivaprep/config.toml)
/// 3. Built-in defaults
/// then environment variables, then CLI flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(path) = cli.config.as_deref() {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path()?)?
    }
    .with_env_overrides();

    if let Some(server) = &cli.server {
        config.server.url = server.clone();
    }
    if let Some(language) = &cli.language {
        config.speech.language = language.clone();
    }
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }

    Ok(config)
}

/// List available audio input devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// List the voices the speech engine offers.
async fn list_synth_voices() -> Result<()> {
    let synth = EspeakSynth::new();
    let voices = synth.list_voices().await?;

    if voices.is_empty() {
        eprintln!("The speech engine offers no voices");
        std::process::exit(1);
    }

    println!("Available voices:");
    for voice in &voices {
        println!("  {:<12} {}", voice.language, voice.name);
    }

    Ok(())
}
