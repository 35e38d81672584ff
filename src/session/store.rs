//! Durable session record.
//!
//! One JSON file in the user data directory remembers the active session so
//! an interrupted interview can pick its analysis up later. Saves go through
//! a temp-file rename so a crash mid-write never corrupts the record.

use crate::defaults;
use crate::error::{Result, VivaprepError};
use crate::net::api::{AnalysisResult, SessionId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// The on-disk session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub session_id: SessionId,
    /// Present once the analysis has been retrieved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at the default location under the user data directory.
    ///
    /// # Errors
    /// Returns `SessionStore` when no data directory can be determined.
    pub fn open_default() -> Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| VivaprepError::SessionStore {
            message: "could not determine the user data directory".to_string(),
        })?;
        Ok(Self::at(base.join("vivaprep").join(defaults::SESSION_FILE)))
    }

    /// Store at an explicit path (used in tests).
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Persist the record, atomically replacing any previous one.
    pub fn save(&self, session: &PersistedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json =
            serde_json::to_string_pretty(session).map_err(|e| VivaprepError::SessionStore {
                message: format!("failed to encode session record: {}", e),
            })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "session record saved");
        Ok(())
    }

    /// Load the record, if one exists.
    ///
    /// # Errors
    /// A missing file is `Ok(None)`; an unreadable or corrupt file is an
    /// error the caller can surface.
    pub fn load(&self) -> Result<Option<PersistedSession>> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session =
            serde_json::from_str(&json).map_err(|e| VivaprepError::SessionStore {
                message: format!("corrupt session record: {}", e),
            })?;
        Ok(Some(session))
    }

    /// Remove the record. Idempotent: a missing file is success.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "session record cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::at(dir.path().join("session.json"))
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let session = PersistedSession {
            session_id: SessionId::from("abc-123"),
            analysis: None,
        };

        store.save(&session).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, Some(session));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::at(dir.path().join("nested").join("deep").join("session.json"));
        let session = PersistedSession {
            session_id: SessionId::from("abc"),
            analysis: None,
        };

        store.save(&session).unwrap();

        assert!(store.path().exists());
    }

    #[test]
    fn test_save_replaces_previous_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .save(&PersistedSession {
                session_id: SessionId::from("first"),
                analysis: None,
            })
            .unwrap();
        store
            .save(&PersistedSession {
                session_id: SessionId::from("second"),
                analysis: Some(AnalysisResult(json!({"done": true}))),
            })
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.session_id, SessionId::from("second"));
        assert!(loaded.analysis.is_some());
        // No stray temp file left behind
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_load_corrupt_record_is_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "not json {{").unwrap();

        let result = store.load();

        assert!(matches!(result, Err(VivaprepError::SessionStore { .. })));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save(&PersistedSession {
                session_id: SessionId::from("x"),
                analysis: None,
            })
            .unwrap();

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);

        // Clearing again succeeds
        store.clear().unwrap();
    }

    #[test]
    fn test_record_uses_camel_case_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save(&PersistedSession {
                session_id: SessionId::from("abc"),
                analysis: None,
            })
            .unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"sessionId\""));
    }
}
