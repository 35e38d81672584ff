//! Fixed policy constants for vivaprep.
//!
//! The timing bounds here exist to cap user-perceived latency against slow or
//! unreliable analysis backends. They are policy, not tunables, and are
//! deliberately not exposed through configuration.

use std::time::Duration;

/// Audio sample rate in Hz for answer capture.
///
/// 16kHz mono is the standard for speech recognition backends and keeps
/// uploaded answers small.
pub const SAMPLE_RATE: u32 = 16000;

/// Upper bound on a single answer upload, including server-side speech
/// recognition. Past this the request is abandoned, not merely ignored.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(45);

/// Cadence of the analysis result poll loop.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Total budget for one poll loop. Reaching it is not an error: the analysis
/// may still complete server-side and can be checked later.
pub const POLL_DEADLINE: Duration = Duration::from_secs(30);

/// Cadence of the elapsed-time display while recording.
pub const RECORDING_TICK: Duration = Duration::from_secs(1);

/// Default interview backend address.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Default interview working language, used for voice selection.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default speech synthesis rate in words per minute. Slightly slower than
/// the espeak default for clarity.
pub const SPEECH_RATE: u32 = 160;

/// File name of the durable session record inside the data directory.
pub const SESSION_FILE: &str = "session.json";

/// Upload file name the server expects for a captured answer.
pub const ANSWER_FILE_NAME: &str = "recording.wav";
