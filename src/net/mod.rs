//! Interview backend client and submission policy.

pub mod api;
pub mod submit;

pub use api::{
    AnalysisResult, HttpApi, InterviewApi, MockApi, ScriptedUpload, SessionId, UploadReply,
};
pub use submit::{AnalysisPoll, SubmissionCoordinator, SubmissionOutcome};
