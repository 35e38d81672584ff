//! Interview backend API client.
//!
//! The backend speaks JSON with camelCase field names. Answer audio goes up
//! as multipart form data. The client is behind a trait so the orchestration
//! layers can be tested against a scripted backend.

use crate::defaults;
use crate::error::{Result, VivaprepError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Opaque server-assigned session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

/// Server response to an answer upload.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    pub success: bool,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question_index: Option<usize>,
}

/// Completed interview analysis, kept opaque and passed through to display
/// and persistence as the server produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(pub serde_json::Value);

impl AnalysisResult {
    /// Pretty-printed JSON for terminal display.
    pub fn to_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartReply {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct QuestionsReply {
    questions: Vec<String>,
}

/// Trait for the interview backend.
#[async_trait]
pub trait InterviewApi: Send + Sync {
    /// Open a new interview session.
    async fn start_interview(&self) -> Result<SessionId>;

    /// Fetch the ordered question list.
    async fn fetch_questions(&self) -> Result<Vec<String>>;

    /// Upload one recorded answer.
    ///
    /// # Errors
    /// `SubmissionRejected` on a non-2xx response; transport errors
    /// otherwise. Callers own the timeout policy.
    async fn upload_answer(
        &self,
        session: &SessionId,
        question_index: usize,
        wav_bytes: Vec<u8>,
    ) -> Result<UploadReply>;

    /// Check whether the analysis for a session is ready.
    ///
    /// # Returns
    /// `Ok(None)` while the analysis is still being prepared (the server
    /// signals this with a non-2xx status).
    async fn fetch_result(&self, session: &SessionId) -> Result<Option<AnalysisResult>>;
}

/// HTTP client for a real interview backend.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    /// Returns `Http` if the underlying client cannot be constructed.
    pub fn new(base_url: &str) -> Result<Self> {
        // Per-request timeouts are owned by callers; this caps connection
        // establishment only.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl InterviewApi for HttpApi {
    async fn start_interview(&self) -> Result<SessionId> {
        let response = self
            .client
            .post(self.url("/start-interview"))
            .send()
            .await
            .map_err(|e| VivaprepError::FetchFailure {
                message: format!("could not reach the server: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(VivaprepError::FetchFailure {
                message: format!("server returned HTTP {}", response.status().as_u16()),
            });
        }

        let reply: StartReply =
            response
                .json()
                .await
                .map_err(|e| VivaprepError::FetchFailure {
                    message: format!("malformed session response: {}", e),
                })?;
        Ok(SessionId(reply.session_id))
    }

    async fn fetch_questions(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url("/questions"))
            .send()
            .await
            .map_err(|e| VivaprepError::FetchFailure {
                message: format!("could not reach the server: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(VivaprepError::FetchFailure {
                message: format!("server returned HTTP {}", response.status().as_u16()),
            });
        }

        let reply: QuestionsReply =
            response
                .json()
                .await
                .map_err(|e| VivaprepError::FetchFailure {
                    message: format!("malformed questions response: {}", e),
                })?;
        Ok(reply.questions)
    }

    async fn upload_answer(
        &self,
        session: &SessionId,
        question_index: usize,
        wav_bytes: Vec<u8>,
    ) -> Result<UploadReply> {
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name(defaults::ANSWER_FILE_NAME)
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("audio", part)
            .text("sessionId", session.0.clone())
            .text("questionIndex", question_index.to_string());

        let response = self
            .client
            .post(self.url("/upload-audio"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VivaprepError::SubmissionRejected {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response.json().await?)
    }

    async fn fetch_result(&self, session: &SessionId) -> Result<Option<AnalysisResult>> {
        let response = self
            .client
            .get(self.url(&format!("/interview-result/{}", session)))
            .send()
            .await?;

        // Not ready yet is signalled with a non-2xx status, not an error body
        if !response.status().is_success() {
            return Ok(None);
        }

        let value: serde_json::Value = response.json().await?;
        Ok(Some(AnalysisResult(value)))
    }
}

/// One scripted response for a [`MockApi`] upload.
#[derive(Debug, Clone)]
pub enum ScriptedUpload {
    /// Answer with this reply.
    Reply(UploadReply),
    /// Reject with this HTTP status and detail.
    Reject { status: u16, detail: String },
    /// Never answer. Under paused tokio time the caller's timeout fires
    /// first.
    Hang,
}

/// Scripted interview backend for testing.
pub struct MockApi {
    session_id: SessionId,
    questions: Vec<String>,
    questions_failures: AtomicUsize,
    uploads: Mutex<VecDeque<ScriptedUpload>>,
    result: Option<AnalysisResult>,
    result_ready_after: usize,
    upload_calls: AtomicUsize,
    result_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::from("mock-session-1"),
            questions: vec![
                "Tell me about yourself.".to_string(),
                "Why this role?".to_string(),
            ],
            questions_failures: AtomicUsize::new(0),
            uploads: Mutex::new(VecDeque::new()),
            result: None,
            result_ready_after: 0,
            upload_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_session_id(mut self, id: &str) -> Self {
        self.session_id = SessionId::from(id);
        self
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    /// Fail the next `count` question fetches before succeeding.
    pub fn with_questions_failures(self, count: usize) -> Self {
        self.questions_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Append a scripted upload response. Responses are consumed in order.
    pub fn push_upload(self, scripted: ScriptedUpload) -> Self {
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push_back(scripted);
        }
        self
    }

    /// Make the analysis become available after `calls` result fetches have
    /// returned not-ready.
    pub fn with_result_after(mut self, result: AnalysisResult, calls: usize) -> Self {
        self.result = Some(result);
        self.result_ready_after = calls;
        self
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterviewApi for MockApi {
    async fn start_interview(&self) -> Result<SessionId> {
        Ok(self.session_id.clone())
    }

    async fn fetch_questions(&self) -> Result<Vec<String>> {
        let remaining = self.questions_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.questions_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(VivaprepError::FetchFailure {
                message: "mock questions failure".to_string(),
            });
        }
        Ok(self.questions.clone())
    }

    async fn upload_answer(
        &self,
        _session: &SessionId,
        _question_index: usize,
        _wav_bytes: Vec<u8>,
    ) -> Result<UploadReply> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .uploads
            .lock()
            .ok()
            .and_then(|mut uploads| uploads.pop_front());

        match scripted {
            Some(ScriptedUpload::Reply(reply)) => Ok(reply),
            Some(ScriptedUpload::Reject { status, detail }) => {
                Err(VivaprepError::SubmissionRejected { status, detail })
            }
            Some(ScriptedUpload::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(VivaprepError::Other("mock hang elapsed".to_string()))
            }
            None => Err(VivaprepError::Other(
                "mock upload script exhausted".to_string(),
            )),
        }
    }

    async fn fetch_result(&self, _session: &SessionId) -> Result<Option<AnalysisResult>> {
        let calls = self.result_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.result {
            Some(result) if calls > self.result_ready_after => Ok(Some(result.clone())),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upload_reply_camel_case() {
        let json = r#"{"success": true, "isComplete": false, "nextQuestionIndex": 3}"#;
        let reply: UploadReply = serde_json::from_str(json).unwrap();

        assert!(reply.success);
        assert!(!reply.is_complete);
        assert_eq!(reply.next_question_index, Some(3));
    }

    #[test]
    fn test_upload_reply_without_next_index() {
        let json = r#"{"success": true, "isComplete": true}"#;
        let reply: UploadReply = serde_json::from_str(json).unwrap();

        assert!(reply.is_complete);
        assert_eq!(reply.next_question_index, None);
    }

    #[test]
    fn test_session_id_serde_transparent() {
        let id = SessionId::from("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""abc-123""#);

        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_analysis_result_is_opaque() {
        let value = json!({"scores": [7, 8], "summary": "solid answers"});
        let result = AnalysisResult(value.clone());

        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, value);
        assert!(result.to_pretty().contains("solid answers"));
    }

    #[tokio::test]
    async fn test_mock_scripted_uploads_consumed_in_order() {
        let api = MockApi::new()
            .push_upload(ScriptedUpload::Reply(UploadReply {
                success: true,
                is_complete: false,
                next_question_index: Some(1),
            }))
            .push_upload(ScriptedUpload::Reject {
                status: 500,
                detail: "boom".to_string(),
            });
        let session = SessionId::from("s");

        let first = api.upload_answer(&session, 0, vec![]).await.unwrap();
        assert_eq!(first.next_question_index, Some(1));

        let second = api.upload_answer(&session, 0, vec![]).await;
        assert!(matches!(
            second,
            Err(VivaprepError::SubmissionRejected { status: 500, .. })
        ));
        assert_eq!(api.upload_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_result_ready_after_n_calls() {
        let api = MockApi::new().with_result_after(AnalysisResult(json!({"ok": true})), 2);
        let session = SessionId::from("s");

        assert!(api.fetch_result(&session).await.unwrap().is_none());
        assert!(api.fetch_result(&session).await.unwrap().is_none());
        assert!(api.fetch_result(&session).await.unwrap().is_some());
        assert_eq!(api.result_calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_questions_failures_then_success() {
        let api = MockApi::new().with_questions_failures(1);

        assert!(api.fetch_questions().await.is_err());
        assert!(api.fetch_questions().await.is_ok());
    }
}
