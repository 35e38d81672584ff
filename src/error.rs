//! Error types for vivaprep.
//!
//! None of these are fatal to the process: every variant is surfaced to the
//! user as an actionable message and leaves the session in a state the
//! precipitating action can be retried from. Only explicit cancellation or
//! analysis completion ends a session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VivaprepError {
    // Microphone errors
    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Submission errors
    #[error("Answer upload timed out; try again with a shorter recording")]
    SubmissionTimeout,

    #[error("Server rejected the submission (HTTP {status}): {detail}")]
    SubmissionRejected { status: u16, detail: String },

    // Session setup errors
    #[error("Failed to load interview data: {message}")]
    FetchFailure { message: String },

    // Speech synthesis errors
    #[error("Speech synthesis failed: {message}")]
    SpeechSynthesis { message: String },

    // Persistence errors
    #[error("Session store error: {message}")]
    SessionStore { message: String },

    // Wrong-state operations (e.g. submitting without a captured answer)
    #[error("{message}")]
    InvalidState { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VivaprepError>;
