//! Command-line interface for vivaprep
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spoken interview practice from the terminal
#[derive(Parser, Debug)]
#[command(
    name = "vivaprep",
    version,
    about = "Spoken interview practice from the terminal"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Interview server URL (e.g., http://127.0.0.1:5000)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Language code for voice selection (e.g., en, de, fr)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Do not read questions aloud
    #[arg(long)]
    pub no_speech: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the analysis of the most recent interview
    Results,

    /// Forget the stored interview session
    Reset,

    /// List available audio input devices
    Devices,

    /// List available speech synthesis voices
    Voices,
}
