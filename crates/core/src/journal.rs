use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::gateway::GatewayError;
use crate::session::SessionKey;
use crate::status::{DebugCommand, DebugLocation, DebugStatus};
use crate::subscriber::DebugSubscriber;

const JOURNAL_FILE: &str = "journal.ndjson";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    Transition,
    Failure,
    DecorationsCleared,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalRecord {
    pub timestamp_unix_ms: u128,
    pub session: SessionKey,
    pub event: JournalEvent,
    pub status: Option<DebugStatus>,
    pub line: Option<u32>,
    pub command: Option<DebugCommand>,
    pub error: Option<String>,
}

impl JournalRecord {
    fn new(session: &SessionKey, event: JournalEvent) -> Self {
        Self {
            timestamp_unix_ms: unix_timestamp_millis(),
            session: session.clone(),
            event,
            status: None,
            line: None,
            command: None,
            error: None,
        }
    }
}

#[must_use]
pub fn unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("invalid journal path `{0}`")]
    InvalidPath(PathBuf),
    #[error("failed to create journal directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize journal record: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append journal record at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileDebugJournal {
    path: PathBuf,
}

impl FileDebugJournal {
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::from_path(dir.as_ref().join(JOURNAL_FILE))
    }

    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let parent_dir = self
            .path
            .parent()
            .ok_or_else(|| JournalError::InvalidPath(self.path.clone()))?;
        fs::create_dir_all(parent_dir).map_err(|source| JournalError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;

        let rendered =
            serde_json::to_string(record).map_err(|source| JournalError::Serialize { source })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| JournalError::Write {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{rendered}").map_err(|source| JournalError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn record(&self, record: &JournalRecord) {
        if let Err(error) = self.append(record) {
            warn!(
                target: "pldbg",
                session = %record.session,
                error = %error,
                "journal_append_failed"
            );
        }
    }
}

impl DebugSubscriber for FileDebugJournal {
    fn on_transition(
        &self,
        key: &SessionKey,
        status: DebugStatus,
        location: Option<DebugLocation>,
    ) {
        let mut record = JournalRecord::new(key, JournalEvent::Transition);
        record.status = Some(status);
        record.line = location.map(|location| location.line);
        self.record(&record);
    }

    fn on_failure(&self, key: &SessionKey, command: DebugCommand, error: &GatewayError) {
        let mut record = JournalRecord::new(key, JournalEvent::Failure);
        record.command = Some(command);
        record.error = Some(error.to_string());
        self.record(&record);
    }

    fn on_decorations_cleared(&self, key: &SessionKey) {
        self.record(&JournalRecord::new(key, JournalEvent::DecorationsCleared));
    }
}
