//! Speech synthesis backends.
//!
//! Questions are read aloud through an external `espeak-ng` process. The
//! backend is behind a trait so the announcer and the tests can run without
//! a speech engine installed.

use crate::defaults;
use crate::error::{Result, VivaprepError};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// A voice offered by the synthesis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Engine-specific voice identifier, passed back verbatim.
    pub name: String,
    /// Language tag the voice speaks, e.g. "en-us".
    pub language: String,
}

/// Trait for text-to-speech backends.
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Enumerate the voices the engine offers.
    ///
    /// # Errors
    /// Returns `SpeechSynthesis` when the engine is unavailable.
    async fn list_voices(&self) -> Result<Vec<Voice>>;

    /// Speak the given text with the given voice, returning when playback
    /// finishes or the token is cancelled.
    ///
    /// Cancellation stops audio promptly and is not an error.
    ///
    /// # Errors
    /// Returns `SpeechSynthesis` when the engine fails to start or exits
    /// abnormally.
    async fn synthesize(&self, text: &str, voice: &Voice, cancel: &CancellationToken)
    -> Result<()>;
}

/// Pick the voice to read questions with.
///
/// Prefers the first voice whose language matches the configured language
/// prefix; falls back to the engine's first voice. Returns None only when
/// the engine offers no voices at all.
pub fn select_voice(voices: &[Voice], language: &str) -> Option<Voice> {
    voices
        .iter()
        .find(|v| v.language.starts_with(language))
        .or_else(|| voices.first())
        .cloned()
}

/// Speech synthesis via the `espeak-ng` command-line engine.
pub struct EspeakSynth {
    rate: u32,
}

impl EspeakSynth {
    pub fn new() -> Self {
        Self {
            rate: defaults::SPEECH_RATE,
        }
    }

    /// Override the speaking rate (words per minute).
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }
}

impl Default for EspeakSynth {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the output of `espeak-ng --voices`.
///
/// Each data line looks like:
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-us           M  english-us           en-us
/// ```
fn parse_voices(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1) // header row
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            Some(Voice {
                language: parts[1].to_string(),
                name: parts[3].to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl SpeechSynth for EspeakSynth {
    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new("espeak-ng")
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VivaprepError::SpeechSynthesis {
                message: format!("failed to run espeak-ng: {}", e),
            })?;

        if !output.status.success() {
            return Err(VivaprepError::SpeechSynthesis {
                message: format!("espeak-ng --voices exited with {}", output.status),
            });
        }

        Ok(parse_voices(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &Voice,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut child = Command::new("espeak-ng")
            .arg("-v")
            .arg(&voice.name)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VivaprepError::SpeechSynthesis {
                message: format!("failed to start espeak-ng: {}", e),
            })?;

        enum Waited {
            Done(std::process::ExitStatus),
            Cancelled,
        }

        let waited = tokio::select! {
            status = child.wait() => {
                Waited::Done(status.map_err(|e| VivaprepError::SpeechSynthesis {
                    message: format!("failed to wait for espeak-ng: {}", e),
                })?)
            }
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        match waited {
            Waited::Done(status) if status.success() => Ok(()),
            Waited::Done(status) => Err(VivaprepError::SpeechSynthesis {
                message: format!("espeak-ng exited with {}", status),
            }),
            Waited::Cancelled => {
                // Kill promptly; the child is also kill_on_drop as a backstop
                let _ = child.start_kill();
                Ok(())
            }
        }
    }
}

/// Mock speech backend for testing.
pub struct MockSynth {
    voices: Vec<Voice>,
    utterance_duration: Option<Duration>,
    fail_synthesis: bool,
    fail_list: bool,
    utterances: Mutex<Vec<String>>,
    active: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
    cancelled_count: Arc<AtomicU32>,
}

impl MockSynth {
    pub fn new() -> Self {
        Self {
            voices: vec![
                Voice {
                    name: "english-us".to_string(),
                    language: "en-us".to_string(),
                },
                Voice {
                    name: "german".to_string(),
                    language: "de".to_string(),
                },
            ],
            utterance_duration: None,
            fail_synthesis: false,
            fail_list: false,
            utterances: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
            cancelled_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Configure the voice list.
    pub fn with_voices(mut self, voices: Vec<Voice>) -> Self {
        self.voices = voices;
        self
    }

    /// Make every utterance take the given (tokio) time, cancellable.
    pub fn with_utterance_duration(mut self, duration: Duration) -> Self {
        self.utterance_duration = Some(duration);
        self
    }

    /// Configure synthesis to fail.
    pub fn with_synthesis_failure(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    /// Configure voice listing to fail.
    pub fn with_list_failure(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Texts spoken so far, in order.
    pub fn utterances(&self) -> Vec<String> {
        self.utterances
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Highest number of utterances ever in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Number of utterances that were cut short by cancellation.
    pub fn cancelled_count(&self) -> u32 {
        self.cancelled_count.load(Ordering::SeqCst)
    }
}

impl Default for MockSynth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynth for MockSynth {
    async fn list_voices(&self) -> Result<Vec<Voice>> {
        if self.fail_list {
            return Err(VivaprepError::SpeechSynthesis {
                message: "mock voice listing failure".to_string(),
            });
        }
        Ok(self.voices.clone())
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &Voice,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.fail_synthesis {
            return Err(VivaprepError::SpeechSynthesis {
                message: "mock synthesis failure".to_string(),
            });
        }

        if let Ok(mut utterances) = self.utterances.lock() {
            utterances.push(text.to_string());
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now_active, Ordering::SeqCst);

        if let Some(duration) = self.utterance_duration {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = cancel.cancelled() => {
                    self.cancelled_count.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Flag to ensure the speech availability warning prints only once.
static ESPEAK_WARNING_SHOWN: AtomicBool = AtomicBool::new(false);

/// Check whether espeak-ng is installed, warning once if not.
pub async fn check_engine_available() -> bool {
    let available = Command::new("espeak-ng")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    if !available && !ESPEAK_WARNING_SHOWN.swap(true, Ordering::SeqCst) {
        tracing::warn!("espeak-ng not found; questions will not be read aloud");
    }

    available
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_VOICES_OUTPUT: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  de              --/M      German             gmw/de
 2  en-gb           --/M      English_(Great_Britain) gmw/en               (en 2)
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
";

    #[test]
    fn test_parse_voices_output() {
        let voices = parse_voices(SAMPLE_VOICES_OUTPUT);

        assert_eq!(voices.len(), 4);
        assert_eq!(voices[0].language, "af");
        assert_eq!(voices[0].name, "Afrikaans");
        assert_eq!(voices[3].language, "en-us");
        assert_eq!(voices[3].name, "English_(America)");
    }

    #[test]
    fn test_parse_voices_skips_malformed_lines() {
        let output = "header\nshort line\n 5  de  --/M  German  gmw/de\n";
        let voices = parse_voices(output);

        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].language, "de");
    }

    #[test]
    fn test_select_voice_prefers_language_match() {
        let voices = parse_voices(SAMPLE_VOICES_OUTPUT);

        let voice = select_voice(&voices, "en").unwrap();
        assert_eq!(voice.language, "en-gb");

        let voice = select_voice(&voices, "en-us").unwrap();
        assert_eq!(voice.language, "en-us");

        let voice = select_voice(&voices, "de").unwrap();
        assert_eq!(voice.name, "German");
    }

    #[test]
    fn test_select_voice_falls_back_to_first() {
        let voices = parse_voices(SAMPLE_VOICES_OUTPUT);

        let voice = select_voice(&voices, "zz").unwrap();
        assert_eq!(voice.language, "af");
    }

    #[test]
    fn test_select_voice_empty_list() {
        assert!(select_voice(&[], "en").is_none());
    }

    #[tokio::test]
    async fn test_mock_records_utterances() {
        let synth = MockSynth::new();
        let voice = Voice {
            name: "english-us".to_string(),
            language: "en-us".to_string(),
        };
        let cancel = CancellationToken::new();

        synth.synthesize("first", &voice, &cancel).await.unwrap();
        synth.synthesize("second", &voice, &cancel).await.unwrap();

        assert_eq!(synth.utterances(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_utterance_cancellation() {
        let synth = MockSynth::new().with_utterance_duration(Duration::from_secs(10));
        let voice = Voice {
            name: "english-us".to_string(),
            language: "en-us".to_string(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        synth.synthesize("cut short", &voice, &cancel).await.unwrap();

        assert_eq!(synth.cancelled_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_synthesis_failure() {
        let synth = MockSynth::new().with_synthesis_failure();
        let voice = Voice {
            name: "english-us".to_string(),
            language: "en-us".to_string(),
        };

        let result = synth
            .synthesize("text", &voice, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(VivaprepError::SpeechSynthesis { .. })
        ));
    }
}
