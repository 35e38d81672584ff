//! vivaprep: spoken interview practice from the terminal.
//!
//! Records answers from the microphone, reads questions aloud, submits
//! answers to an interview backend for transcription, and retrieves the
//! final analysis. The pieces compose behind traits so each can be tested
//! in isolation:
//!
//! - [`audio`]: microphone capture and answer recording
//! - [`speech`]: reading questions aloud via espeak-ng
//! - [`net`]: the backend client, upload timeout and analysis polling
//! - [`session`]: interview orchestration and the durable session record
//! - [`config`]: TOML configuration with environment overrides

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod net;
pub mod session;
pub mod speech;

pub use error::{Result, VivaprepError};
