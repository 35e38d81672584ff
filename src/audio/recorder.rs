//! Answer recording state machine.
//!
//! A [`Recorder`] owns a microphone source and moves through three states:
//! idle, recording, and holding a captured answer. Captured audio is encoded
//! as a 16kHz mono WAV artifact ready for upload.

use crate::defaults;
use crate::error::{Result, VivaprepError};
use std::io::Cursor;
use std::time::{Duration, Instant};

use super::capture::MicrophoneSource;

/// Clock abstraction for testable elapsed-time tracking.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Real clock using std::time::Instant.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Mock clock for testing, advanced manually.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: std::sync::Arc<std::sync::Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            current: std::sync::Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    /// Advance the mock clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += duration;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.current
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|_| Instant::now())
    }
}

/// A captured answer, encoded and ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    /// WAV-encoded bytes (16-bit PCM, 16kHz, mono).
    pub wav_bytes: Vec<u8>,
    /// Length of the recording.
    pub duration: Duration,
}

impl AudioArtifact {
    /// Encode raw PCM samples into a WAV artifact.
    ///
    /// # Errors
    /// Returns `AudioCapture` if WAV encoding fails.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| {
                VivaprepError::AudioCapture {
                    message: format!("Failed to create WAV writer: {}", e),
                }
            })?;
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| VivaprepError::AudioCapture {
                        message: format!("Failed to encode sample: {}", e),
                    })?;
            }
            writer
                .finalize()
                .map_err(|e| VivaprepError::AudioCapture {
                    message: format!("Failed to finalize WAV data: {}", e),
                })?;
        }

        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);
        Ok(Self {
            wav_bytes: cursor.into_inner(),
            duration,
        })
    }
}

/// Where the recorder currently is in its lifecycle.
enum RecorderState {
    Idle,
    Recording { started_at: Instant },
    Captured(AudioArtifact),
}

/// Records one answer at a time from a microphone source.
///
/// Generic over the microphone (real device or mock) and the clock.
pub struct Recorder<M: MicrophoneSource, C: Clock = SystemClock> {
    mic: M,
    clock: C,
    state: RecorderState,
}

impl<M: MicrophoneSource> Recorder<M, SystemClock> {
    /// Create a recorder over the given microphone with the system clock.
    pub fn new(mic: M) -> Self {
        Self::with_clock(mic, SystemClock)
    }
}

impl<M: MicrophoneSource, C: Clock> Recorder<M, C> {
    /// Create a recorder with an explicit clock (used in tests).
    pub fn with_clock(mic: M, clock: C) -> Self {
        Self {
            mic,
            clock,
            state: RecorderState::Idle,
        }
    }

    /// Begin capturing a new answer.
    ///
    /// Starting over a previously captured answer discards it; the old take
    /// is gone the moment a new one begins. Starting while already recording
    /// is an error.
    ///
    /// # Errors
    /// `InvalidState` when already recording; microphone errors (typically
    /// `PermissionDenied`) leave the recorder idle.
    pub fn start(&mut self) -> Result<()> {
        if matches!(self.state, RecorderState::Recording { .. }) {
            return Err(VivaprepError::InvalidState {
                message: "already recording".to_string(),
            });
        }

        self.mic.start()?;
        self.state = RecorderState::Recording {
            started_at: self.clock.now(),
        };
        Ok(())
    }

    /// Stop capturing and encode the answer.
    ///
    /// On success the recorder holds the captured artifact. On failure the
    /// microphone is released and the recorder returns to idle, so a fresh
    /// take can be started.
    ///
    /// # Errors
    /// `InvalidState` when not recording; capture or encoding errors
    /// otherwise.
    pub fn stop(&mut self) -> Result<()> {
        let started_at = match self.state {
            RecorderState::Recording { started_at } => started_at,
            _ => {
                return Err(VivaprepError::InvalidState {
                    message: "not recording".to_string(),
                });
            }
        };

        let outcome = self.finish_capture(started_at);
        match outcome {
            Ok(artifact) => {
                self.state = RecorderState::Captured(artifact);
                Ok(())
            }
            Err(e) => {
                self.state = RecorderState::Idle;
                Err(e)
            }
        }
    }

    fn finish_capture(&mut self, started_at: Instant) -> Result<AudioArtifact> {
        let samples = self.mic.take_samples();
        // Release the hardware even when draining failed
        let stopped = self.mic.stop();
        let samples = samples?;
        stopped?;

        let mut artifact = AudioArtifact::from_samples(&samples, defaults::SAMPLE_RATE)?;
        // Wall-clock elapsed is authoritative for display; the sample count
        // can lag behind with coarse device buffers.
        artifact.duration = self.clock.now().duration_since(started_at);
        Ok(artifact)
    }

    /// Drop a captured answer without submitting it.
    ///
    /// No-op when there is nothing captured.
    pub fn discard(&mut self) {
        if matches!(self.state, RecorderState::Captured(_)) {
            self.state = RecorderState::Idle;
        }
    }

    /// Return to idle from any state, releasing the microphone if held.
    ///
    /// Never fails: release errors are logged and swallowed. Used on
    /// cancellation, where cleanup must complete regardless.
    pub fn abort(&mut self) {
        if self.mic.is_capturing()
            && let Err(e) = self.mic.stop()
        {
            tracing::warn!(error = %e, "failed to release microphone during abort");
        }
        self.state = RecorderState::Idle;
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    /// Whole seconds elapsed since recording started, or None when idle.
    pub fn elapsed_secs(&self) -> Option<u64> {
        match self.state {
            RecorderState::Recording { started_at } => {
                Some(self.clock.now().duration_since(started_at).as_secs())
            }
            _ => None,
        }
    }

    /// The captured answer, if one is being held.
    ///
    /// Borrowed rather than consumed so a failed upload keeps the take
    /// available for retry.
    pub fn artifact(&self) -> Option<&AudioArtifact> {
        match &self.state {
            RecorderState::Captured(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Take the captured answer out, leaving the recorder idle.
    pub fn take_artifact(&mut self) -> Option<AudioArtifact> {
        match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Captured(artifact) => Some(artifact),
            other => {
                self.state = other;
                None
            }
        }
    }
}
