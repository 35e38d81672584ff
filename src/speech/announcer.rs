//! Question announcer.
//!
//! Reads interview questions aloud in the background. Speech is best-effort:
//! an unavailable or failing engine never blocks the interview, it only goes
//! quiet. At most one utterance plays at a time; a new one silences whatever
//! was still playing.

use super::synth::{SpeechSynth, Voice, select_voice};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Announcer {
    synth: Arc<dyn SpeechSynth>,
    language: String,
    enabled: bool,
    voice: Option<Voice>,
    voice_resolved: bool,
    speaking: Arc<AtomicBool>,
    current_cancel: Option<CancellationToken>,
    current_task: Option<JoinHandle<()>>,
}

impl Announcer {
    /// Create an announcer over the given backend.
    ///
    /// `language` steers voice selection; see [`select_voice`].
    pub fn new(synth: Arc<dyn SpeechSynth>, language: &str) -> Self {
        Self {
            synth,
            language: language.to_string(),
            enabled: true,
            voice: None,
            voice_resolved: false,
            speaking: Arc::new(AtomicBool::new(false)),
            current_cancel: None,
            current_task: None,
        }
    }

    /// Resolve the voice once, on first use. A backend without voices or a
    /// failing listing silences the announcer rather than erroring.
    async fn resolve_voice(&mut self) -> Option<Voice> {
        if !self.voice_resolved {
            self.voice_resolved = true;
            match self.synth.list_voices().await {
                Ok(voices) => {
                    self.voice = select_voice(&voices, &self.language);
                    if self.voice.is_none() {
                        tracing::debug!("speech engine offers no voices; staying silent");
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "voice listing failed; staying silent");
                }
            }
        }
        self.voice.clone()
    }

    /// Speak the given text in the background.
    ///
    /// Silences any utterance still playing first, so utterances never
    /// overlap. Returns immediately; playback continues in a spawned task.
    /// No-op while speech is disabled.
    pub async fn speak(&mut self, text: &str) {
        if !self.enabled {
            return;
        }

        // Silence the previous utterance and wait for it to wind down before
        // starting the next one.
        self.stop();
        if let Some(task) = self.current_task.take() {
            let _ = task.await;
        }

        let Some(voice) = self.resolve_voice().await else {
            return;
        };

        let cancel = CancellationToken::new();
        let synth = Arc::clone(&self.synth);
        let speaking = Arc::clone(&self.speaking);
        let text = text.to_string();
        let task_cancel = cancel.clone();

        speaking.store(true, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            if let Err(e) = synth.synthesize(&text, &voice, &task_cancel).await {
                tracing::debug!(error = %e, "speech synthesis failed");
            }
            speaking.store(false, Ordering::SeqCst);
        });

        self.current_cancel = Some(cancel);
        self.current_task = Some(task);
    }

    /// Cut off the current utterance, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.current_cancel.take() {
            cancel.cancel();
        }
    }

    /// Enable or disable speech output.
    ///
    /// Disabling does not cut off an utterance already playing; callers that
    /// want immediate silence call [`stop`](Self::stop) as well.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether an utterance is currently playing.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::synth::MockSynth;
    use std::time::Duration;

    fn announcer_with(synth: MockSynth) -> (Announcer, Arc<MockSynth>) {
        let synth = Arc::new(synth);
        let announcer = Announcer::new(Arc::clone(&synth) as Arc<dyn SpeechSynth>, "en");
        (announcer, synth)
    }

    #[tokio::test]
    async fn test_speak_records_utterance() {
        let (mut announcer, synth) = announcer_with(MockSynth::new());

        announcer.speak("What is your greatest strength?").await;
        // Wait for the background task to finish
        if let Some(task) = announcer.current_task.take() {
            task.await.unwrap();
        }

        assert_eq!(
            synth.utterances(),
            vec!["What is your greatest strength?"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_utterance_silences_previous() {
        let (mut announcer, synth) =
            announcer_with(MockSynth::new().with_utterance_duration(Duration::from_secs(30)));

        announcer.speak("question one").await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(announcer.is_speaking());

        announcer.speak("question two").await;
        if let Some(task) = announcer.current_task.take() {
            tokio::time::advance(Duration::from_secs(31)).await;
            task.await.unwrap();
        }

        assert_eq!(synth.utterances(), vec!["question one", "question two"]);
        assert_eq!(synth.cancelled_count(), 1);
        assert_eq!(synth.max_concurrent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cuts_off_utterance() {
        let (mut announcer, synth) =
            announcer_with(MockSynth::new().with_utterance_duration(Duration::from_secs(30)));

        announcer.speak("a long question").await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        announcer.stop();
        if let Some(task) = announcer.current_task.take() {
            task.await.unwrap();
        }

        assert!(!announcer.is_speaking());
        assert_eq!(synth.cancelled_count(), 1);

        // Stop with nothing playing is a no-op
        announcer.stop();
    }

    #[tokio::test]
    async fn test_disabled_announcer_stays_silent() {
        let (mut announcer, synth) = announcer_with(MockSynth::new());

        announcer.set_enabled(false);
        announcer.speak("unheard").await;

        assert!(announcer.current_task.is_none());
        assert!(synth.utterances().is_empty());

        announcer.set_enabled(true);
        announcer.speak("heard").await;
        if let Some(task) = announcer.current_task.take() {
            task.await.unwrap();
        }
        assert_eq!(synth.utterances(), vec!["heard"]);
    }

    #[tokio::test]
    async fn test_failing_voice_listing_is_swallowed() {
        let (mut announcer, synth) = announcer_with(MockSynth::new().with_list_failure());

        announcer.speak("anything").await;

        assert!(announcer.current_task.is_none());
        assert!(synth.utterances().is_empty());
        assert!(!announcer.is_speaking());
    }

    #[tokio::test]
    async fn test_no_voices_is_swallowed() {
        let (mut announcer, synth) = announcer_with(MockSynth::new().with_voices(vec![]));

        announcer.speak("anything").await;

        assert!(announcer.current_task.is_none());
        assert!(synth.utterances().is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_swallowed() {
        let (mut announcer, _synth) = announcer_with(MockSynth::new().with_synthesis_failure());

        announcer.speak("anything").await;
        if let Some(task) = announcer.current_task.take() {
            task.await.unwrap();
        }

        // The failure was logged, not surfaced
        assert!(!announcer.is_speaking());
    }
}
