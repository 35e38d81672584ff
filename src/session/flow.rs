//! Interview session orchestration.
//!
//! [`InterviewFlow`] ties the recorder, announcer, backend client and session
//! store together into one state machine: load questions, record and submit
//! an answer per question, then poll for the analysis. Any error leaves the
//! session where it was so the failed step can be retried; only explicit
//! cancellation or a delivered analysis ends it.

use crate::audio::capture::MicrophoneSource;
use crate::audio::recorder::{Clock, Recorder, SystemClock};
use crate::error::{Result, VivaprepError};
use crate::net::api::{AnalysisResult, SessionId};
use crate::net::submit::{AnalysisPoll, SubmissionCoordinator, SubmissionOutcome};
use crate::session::store::{PersistedSession, SessionStore};
use crate::speech::announcer::Announcer;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session yet, or the last load attempt failed.
    Loading,
    /// Answering questions; `index` is the current one.
    Active { index: usize },
    /// All answers are in; waiting on the analysis.
    Analyzing,
    /// Analysis delivered.
    Completed,
    /// The poll budget ran out; the analysis may arrive later.
    ResultPending,
    /// The user abandoned the session.
    Cancelled,
}

/// What a submitted answer moved the session to.
#[derive(Debug)]
pub enum SubmitProgress {
    /// On to the next question.
    Advanced { next_index: usize },
    /// The interview is over and the analysis arrived.
    Completed(AnalysisResult),
    /// The interview is over but the analysis was not ready in time.
    /// The session stays resumable.
    ResultPending,
    /// The session was cancelled while waiting.
    Cancelled,
}

pub struct InterviewFlow<M: MicrophoneSource, C: Clock = SystemClock> {
    coordinator: SubmissionCoordinator,
    recorder: Recorder<M, C>,
    announcer: Announcer,
    store: SessionStore,
    cancel: CancellationToken,
    session_id: Option<SessionId>,
    questions: Vec<String>,
    phase: Phase,
}

impl<M: MicrophoneSource, C: Clock> InterviewFlow<M, C> {
    pub fn new(
        coordinator: SubmissionCoordinator,
        recorder: Recorder<M, C>,
        announcer: Announcer,
        store: SessionStore,
    ) -> Self {
        Self {
            coordinator,
            recorder,
            announcer,
            store,
            cancel: CancellationToken::new(),
            session_id: None,
            questions: Vec::new(),
            phase: Phase::Loading,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// The question being answered, when one is.
    pub fn current_question(&self) -> Option<&str> {
        match self.phase {
            Phase::Active { index } => self.questions.get(index).map(String::as_str),
            _ => None,
        }
    }

    /// Token observed by every wait inside the flow. The app clones it to
    /// cancel from a signal handler while a submit or poll is in flight.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open a session and load the questions.
    ///
    /// Re-invokable: a failed load leaves the phase at `Loading` and the next
    /// call starts over. The session record is persisted before the question
    /// fetch, so even a half-started session can be cleaned up or resumed.
    ///
    /// # Errors
    /// `InvalidState` when a session is already active; `FetchFailure` when
    /// the backend cannot be reached or returns no questions.
    pub async fn start(&mut self, api: &dyn crate::net::api::InterviewApi) -> Result<()> {
        if !matches!(self.phase, Phase::Loading) {
            return Err(VivaprepError::InvalidState {
                message: "an interview is already in progress".to_string(),
            });
        }

        let session_id = api.start_interview().await?;
        info!(%session_id, "interview session opened");

        self.store.save(&PersistedSession {
            session_id: session_id.clone(),
            analysis: None,
        })?;
        self.session_id = Some(session_id);

        let questions = api.fetch_questions().await?;
        if questions.is_empty() {
            return Err(VivaprepError::FetchFailure {
                message: "the server returned no questions".to_string(),
            });
        }

        info!(count = questions.len(), "questions loaded");
        self.questions = questions;
        self.phase = Phase::Active { index: 0 };
        self.announce_current().await;
        Ok(())
    }

    /// Pick up a previously persisted session and wait for its analysis.
    ///
    /// A record that already carries the analysis returns it immediately;
    /// otherwise another bounded poll loop runs.
    pub async fn resume(&mut self, record: PersistedSession) -> Result<SubmitProgress> {
        info!(session_id = %record.session_id, "resuming session");
        self.session_id = Some(record.session_id);

        if let Some(analysis) = record.analysis {
            self.phase = Phase::Completed;
            return Ok(SubmitProgress::Completed(analysis));
        }

        self.phase = Phase::Analyzing;
        self.finish_analysis().await
    }

    /// Begin recording an answer for the current question.
    pub fn start_recording(&mut self) -> Result<()> {
        self.require_active()?;
        self.recorder.start()
    }

    /// Stop recording; the answer is held for review or submission.
    pub fn stop_recording(&mut self) -> Result<()> {
        self.recorder.stop()
    }

    /// Throw away the held answer to record a fresh take.
    pub fn discard_answer(&mut self) {
        self.recorder.discard();
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recording_elapsed_secs(&self) -> Option<u64> {
        self.recorder.elapsed_secs()
    }

    pub fn has_answer(&self) -> bool {
        self.recorder.artifact().is_some()
    }

    /// Submit the held answer for the current question.
    ///
    /// On any error the answer stays held, so the submission can be retried
    /// or the take redone. On success the answer is discarded and the
    /// session advances; after the final answer this runs the analysis poll.
    pub async fn submit_answer(&mut self) -> Result<SubmitProgress> {
        let index = match self.phase {
            Phase::Active { index } => index,
            _ => {
                return Err(VivaprepError::InvalidState {
                    message: "no question is awaiting an answer".to_string(),
                });
            }
        };
        let session_id = self.require_session()?.clone();
        let wav_bytes = match self.recorder.artifact() {
            Some(artifact) => artifact.wav_bytes.clone(),
            None => {
                return Err(VivaprepError::InvalidState {
                    message: "record an answer before submitting".to_string(),
                });
            }
        };

        enum Waited {
            Cancelled,
            Done(Result<SubmissionOutcome>),
        }

        let cancel = self.cancel.clone();
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => Waited::Cancelled,
            outcome = self.coordinator.submit(&session_id, index, wav_bytes) => {
                Waited::Done(outcome)
            }
        };
        let outcome = match waited {
            Waited::Cancelled => {
                self.run_cancel_cleanup();
                return Ok(SubmitProgress::Cancelled);
            }
            Waited::Done(outcome) => outcome?,
        };

        // Only now is the take consumed
        self.recorder.discard();

        match outcome {
            SubmissionOutcome::Advance(next_index) => {
                self.phase = Phase::Active { index: next_index };
                self.announce_current().await;
                Ok(SubmitProgress::Advanced { next_index })
            }
            SubmissionOutcome::Complete => {
                self.phase = Phase::Analyzing;
                self.finish_analysis().await
            }
        }
    }

    /// Run the bounded analysis poll and settle the session accordingly.
    async fn finish_analysis(&mut self) -> Result<SubmitProgress> {
        let session_id = self.require_session()?.clone();

        let cancel = self.cancel.clone();
        let poll = self.coordinator.await_analysis(&session_id, &cancel).await;
        match poll {
            AnalysisPoll::Ready(analysis) => {
                // Keep the analysis on disk so `vivaprep results` can show it
                self.store.save(&PersistedSession {
                    session_id,
                    analysis: Some(analysis.clone()),
                })?;
                self.phase = Phase::Completed;
                Ok(SubmitProgress::Completed(analysis))
            }
            AnalysisPoll::TimedOut => {
                // The record stays so the result can be checked later
                self.phase = Phase::ResultPending;
                Ok(SubmitProgress::ResultPending)
            }
            AnalysisPoll::Cancelled => {
                self.run_cancel_cleanup();
                Ok(SubmitProgress::Cancelled)
            }
        }
    }

    /// Abandon the session: stop whatever is running and forget the record.
    ///
    /// Safe to call in any phase; each cleanup step runs regardless of the
    /// others.
    pub fn cancel(&mut self) {
        info!("interview cancelled");
        self.run_cancel_cleanup();
    }

    fn run_cancel_cleanup(&mut self) {
        self.recorder.abort();
        self.announcer.stop();
        self.cancel.cancel();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear the session record");
        }
        self.phase = Phase::Cancelled;
    }

    /// Read the current question aloud.
    pub async fn announce_current(&mut self) {
        let text = match self.phase {
            Phase::Active { index } => self.questions.get(index).cloned(),
            _ => None,
        };
        if let Some(text) = text {
            self.announcer.speak(&text).await;
        }
    }

    /// Silence the announcer and toggle it.
    pub fn set_speech_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.announcer.stop();
        }
        self.announcer.set_enabled(enabled);
    }

    pub fn speech_enabled(&self) -> bool {
        self.announcer.is_enabled()
    }

    fn require_active(&self) -> Result<()> {
        match self.phase {
            Phase::Active { .. } => Ok(()),
            _ => Err(VivaprepError::InvalidState {
                message: "no question is awaiting an answer".to_string(),
            }),
        }
    }

    fn require_session(&self) -> Result<&SessionId> {
        self.session_id
            .as_ref()
            .ok_or_else(|| VivaprepError::InvalidState {
                message: "no session is open".to_string(),
            })
    }
}
