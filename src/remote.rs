//! Remote document store interface and the file-backed implementation.
//!
//! The application keeps its canonical document on a remote file host.
//! `RemoteStore` is the narrow contract with that host: fetch the current
//! document with its revision, push a replacement against an expected
//! revision. Pushing with a stale revision fails with a conflict rather
//! than silently overwriting another writer's work.
//!
//! `FileStore` is the shipped implementation, a directory holding the
//! document plus a revision sidecar. It stands in for the hosted service
//! when the CLI is pointed at a store directory, and in tests.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::automation::now_stamp;
use crate::docstore::atomic_write;

/// Opaque revision identifier handed out by a store on every push.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionToken(String);

impl RevisionToken {
    pub fn new(token: impl Into<String>) -> RevisionToken {
        RevisionToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub content: String,
    pub revision: RevisionToken,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no document in the store")]
    NotFound,
    #[error("revision conflict: pushed against {expected}, store has {actual}")]
    Conflict { expected: String, actual: String },
    #[error("store unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("store state is malformed: {0}")]
    Malformed(String),
}

/// Contract with the document host.
pub trait RemoteStore {
    /// Current document and revision. `NotFound` when the store is empty.
    fn fetch(&self) -> Result<RemoteDocument, RemoteError>;

    /// Replace the document. `expected` must match the store's current
    /// revision (`None` matches an empty store) or the push is rejected
    /// with `Conflict`. Returns the new revision.
    fn push(
        &self,
        content: &str,
        expected: Option<&RevisionToken>,
        message: &str,
    ) -> Result<RevisionToken, RemoteError>;
}

/// Directory-backed store: `document.json` plus a `revision.json` sidecar
/// recording the revision counter and the last push message.
pub struct FileStore {
    document_path: PathBuf,
    revision_path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct RevisionRecord {
    revision: u64,
    message: String,
    saved_at: String,
}

impl FileStore {
    pub fn with_base_dir(dir: impl AsRef<Path>) -> Result<FileStore, RemoteError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(FileStore {
            document_path: dir.join("document.json"),
            revision_path: dir.join("revision.json"),
        })
    }

    fn current_revision(&self) -> Result<Option<u64>, RemoteError> {
        if !self.revision_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.revision_path)?;
        let record: RevisionRecord = serde_json::from_str(&raw)
            .map_err(|e| RemoteError::Malformed(format!("revision sidecar: {e}")))?;
        Ok(Some(record.revision))
    }
}

impl RemoteStore for FileStore {
    fn fetch(&self) -> Result<RemoteDocument, RemoteError> {
        if !self.document_path.exists() {
            return Err(RemoteError::NotFound);
        }
        let content = fs::read_to_string(&self.document_path)?;
        let revision = self
            .current_revision()?
            .ok_or_else(|| RemoteError::Malformed("document present without a revision".into()))?;
        Ok(RemoteDocument {
            content,
            revision: RevisionToken(revision.to_string()),
        })
    }

    fn push(
        &self,
        content: &str,
        expected: Option<&RevisionToken>,
        message: &str,
    ) -> Result<RevisionToken, RemoteError> {
        let current = self.current_revision()?;
        let expected_label = expected.map_or("(none)".to_string(), |t| t.to_string());
        let actual_label = current.map_or("(none)".to_string(), |r| r.to_string());
        let matches = match (expected, current) {
            (None, None) => true,
            (Some(token), Some(revision)) => token.as_str() == revision.to_string(),
            _ => false,
        };
        if !matches {
            return Err(RemoteError::Conflict {
                expected: expected_label,
                actual: actual_label,
            });
        }

        let next = current.unwrap_or(0) + 1;
        atomic_write(&self.document_path, content)?;
        let record = RevisionRecord {
            revision: next,
            message: message.to_string(),
            saved_at: now_stamp(),
        };
        let sidecar = serde_json::to_string_pretty(&record)
            .map_err(|e| RemoteError::Malformed(format!("revision sidecar: {e}")))?;
        atomic_write(&self.revision_path, &sidecar)?;
        Ok(RevisionToken(next.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fetch_on_empty_store_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path()).unwrap();
        assert!(matches!(store.fetch(), Err(RemoteError::NotFound)));
    }

    #[test]
    fn test_push_then_fetch_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path()).unwrap();

        let first = store.push("{\"tasks\":[]}", None, "initial save").unwrap();
        assert_eq!(first.as_str(), "1");

        let doc = store.fetch().unwrap();
        assert_eq!(doc.content, "{\"tasks\":[]}");
        assert_eq!(doc.revision, first);
    }

    #[test]
    fn test_sequential_pushes_advance_the_revision() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path()).unwrap();

        let first = store.push("a", None, "one").unwrap();
        let second = store.push("b", Some(&first), "two").unwrap();
        assert_eq!(second.as_str(), "2");
        assert_eq!(store.fetch().unwrap().content, "b");
    }

    #[test]
    fn test_stale_token_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path()).unwrap();

        let first = store.push("a", None, "one").unwrap();
        store.push("b", Some(&first), "two").unwrap();

        let result = store.push("c", Some(&first), "stale");
        assert!(matches!(result, Err(RemoteError::Conflict { .. })));
        // the losing write must not land
        assert_eq!(store.fetch().unwrap().content, "b");
    }

    #[test]
    fn test_push_without_token_onto_existing_document_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path()).unwrap();
        store.push("a", None, "one").unwrap();

        let result = store.push("b", None, "blind overwrite");
        assert!(matches!(result, Err(RemoteError::Conflict { .. })));
    }

    #[test]
    fn test_document_without_sidecar_is_malformed() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_base_dir(dir.path()).unwrap();
        std::fs::write(dir.path().join("document.json"), "{}").unwrap();

        assert!(matches!(store.fetch(), Err(RemoteError::Malformed(_))));
    }
}
