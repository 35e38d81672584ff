//! Answer submission and analysis polling.
//!
//! Wraps the raw API with the two timing policies of an interview session:
//! a hard 45 second cap on each answer upload, and a bounded 2s/30s poll
//! loop for the final analysis.

use crate::defaults;
use crate::error::{Result, VivaprepError};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{AnalysisResult, InterviewApi, SessionId};

/// What a successful answer upload moved the session to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// More questions remain; this is the next one.
    Advance(usize),
    /// That was the last answer; analysis is being prepared.
    Complete,
}

/// How an analysis poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPoll {
    /// The analysis arrived.
    Ready(AnalysisResult),
    /// The poll budget ran out. The analysis may still complete server-side.
    TimedOut,
    /// The session was cancelled mid-poll.
    Cancelled,
}

/// Applies upload and polling policy on top of an [`InterviewApi`].
pub struct SubmissionCoordinator {
    api: Arc<dyn InterviewApi>,
}

impl SubmissionCoordinator {
    pub fn new(api: Arc<dyn InterviewApi>) -> Self {
        Self { api }
    }

    /// Upload one answer, capped at [`defaults::UPLOAD_TIMEOUT`].
    ///
    /// # Errors
    /// `SubmissionTimeout` when the cap elapses, `SubmissionRejected` when
    /// the server refuses the answer or returns a reply that cannot be acted
    /// on, transport errors otherwise. The caller keeps the recorded answer
    /// on any error so it can be re-submitted.
    pub async fn submit(
        &self,
        session: &SessionId,
        question_index: usize,
        wav_bytes: Vec<u8>,
    ) -> Result<SubmissionOutcome> {
        debug!(%session, question_index, bytes = wav_bytes.len(), "uploading answer");

        let upload = self.api.upload_answer(session, question_index, wav_bytes);
        let reply = match tokio::time::timeout(defaults::UPLOAD_TIMEOUT, upload).await {
            Ok(reply) => reply?,
            Err(_) => {
                warn!(%session, question_index, "answer upload timed out");
                return Err(VivaprepError::SubmissionTimeout);
            }
        };

        if !reply.success {
            return Err(VivaprepError::SubmissionRejected {
                status: 200,
                detail: "server reported the answer was not processed".to_string(),
            });
        }

        if reply.is_complete {
            info!(%session, "final answer accepted");
            return Ok(SubmissionOutcome::Complete);
        }

        match reply.next_question_index {
            Some(next) => {
                debug!(%session, next, "answer accepted");
                Ok(SubmissionOutcome::Advance(next))
            }
            None => Err(VivaprepError::SubmissionRejected {
                status: 200,
                detail: "server did not name the next question".to_string(),
            }),
        }
    }

    /// Poll for the finished analysis every [`defaults::POLL_INTERVAL`], for
    /// at most [`defaults::POLL_DEADLINE`].
    ///
    /// Individual poll failures are logged and absorbed; only the deadline or
    /// cancellation ends the loop without a result. Never returns an error:
    /// all three endings are ordinary outcomes the caller routes on.
    pub async fn await_analysis(
        &self,
        session: &SessionId,
        cancel: &CancellationToken,
    ) -> AnalysisPoll {
        let start = Instant::now();
        let deadline = start + defaults::POLL_DEADLINE;
        // First poll fires one interval in, not immediately: the analysis is
        // never ready the instant the last answer lands.
        let mut ticks =
            tokio::time::interval_at(start + defaults::POLL_INTERVAL, defaults::POLL_INTERVAL);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(%session, "analysis polling cancelled");
                    return AnalysisPoll::Cancelled;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!(%session, "analysis not ready within the poll budget");
                    return AnalysisPoll::TimedOut;
                }
                _ = ticks.tick() => {
                    match self.api.fetch_result(session).await {
                        Ok(Some(result)) => {
                            info!(%session, "analysis ready");
                            return AnalysisPoll::Ready(result);
                        }
                        Ok(None) => {
                            debug!(%session, "analysis not ready yet");
                        }
                        Err(e) => {
                            // A flaky poll is not a failed session
                            warn!(%session, error = %e, "analysis poll failed");
                        }
                    }
                }
            }
        }
    }
}
