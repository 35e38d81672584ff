//! Session orchestration and persistence.

pub mod flow;
pub mod store;

pub use flow::{InterviewFlow, Phase, SubmitProgress};
pub use store::{PersistedSession, SessionStore};
