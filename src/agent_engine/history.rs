use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::actions::Action;
use crate::errors::PilotResult;

/// One agent iteration as written to the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub iteration: u64,
    /// Raw decision-service reply, when one arrived.
    pub decision: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn new(iteration: u64) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            iteration,
            decision: None,
            actions: Vec::new(),
            error: None,
        }
    }
}

/// Append-only JSONL log of one agent run.
pub struct SessionHistory {
    pub session_id: String,
    file_path: PathBuf,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::in_dir(&sessions_dir())
    }

    pub fn in_dir(dir: &Path) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn append(&self, entry: &HistoryEntry) -> PilotResult<()> {
        let line = serde_json::to_string(entry)?;
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(
            path = %self.file_path.display(),
            iteration = entry.iteration,
            "history entry appended"
        );
        Ok(())
    }
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// `<data dir>/SurfacePilot/sessions`, falling back to the working directory.
fn sessions_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(base) => base.join("SurfacePilot").join("sessions"),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
