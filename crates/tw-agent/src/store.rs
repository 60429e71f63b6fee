use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque session identifier, chosen before the backend process starts so
/// that every on-disk path is stable from the first byte of output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn allocate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts any caller-supplied id that is usable as a file stem.
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let trimmed = raw.trim();
        let usable = !trimmed.is_empty()
            && trimmed != "."
            && trimmed != ".."
            && !trimmed
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
        if !usable {
            return Err(AgentError::InvalidSessionId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = AgentError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Every file one session owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub log: PathBuf,
    pub pid: PathBuf,
    pub native_id: PathBuf,
    pub backend: PathBuf,
}

/// On-disk layout for sessions: `<logs>/<id>.log` plus pid, native-id and
/// backend markers under the metadata root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    logs_dir: PathBuf,
    meta_dir: PathBuf,
    workdir: PathBuf,
}

impl SessionStore {
    pub fn new(root: PathBuf, logs_dir: PathBuf, meta_dir: PathBuf, workdir: PathBuf) -> Self {
        Self {
            root,
            logs_dir,
            meta_dir,
            workdir,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn paths_for(&self, session_id: &SessionId) -> SessionPaths {
        let id = session_id.as_str();
        SessionPaths {
            log: self.logs_dir.join(format!("{id}.log")),
            pid: self.meta_dir.join(format!("{id}.pid")),
            native_id: self.meta_dir.join(format!("{id}.codex_sid")),
            backend: self.meta_dir.join(format!("{id}.backend")),
        }
    }

    /// Create the logs, metadata and working directories. Idempotent.
    pub fn ensure_directories(&self) -> Result<(), AgentError> {
        for dir in [&self.logs_dir, &self.meta_dir, &self.workdir] {
            fs::create_dir_all(dir).map_err(|e| AgentError::storage(dir.clone(), e))?;
        }
        Ok(())
    }

    /// `path` relative to the project root when it lives underneath it.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    pub fn read_pid(&self, session_id: &SessionId) -> Option<u32> {
        read_marker(&self.paths_for(session_id).pid).and_then(|s| s.parse().ok())
    }

    pub fn has_pid_marker(&self, session_id: &SessionId) -> bool {
        self.paths_for(session_id).pid.exists()
    }

    /// Overwrites the pid marker; a session only ever records its latest process.
    pub fn write_pid(&self, session_id: &SessionId, pid: u32) -> Result<(), AgentError> {
        let path = self.paths_for(session_id).pid;
        fs::write(&path, pid.to_string()).map_err(|e| AgentError::storage(path, e))
    }

    pub fn read_native_id(&self, session_id: &SessionId) -> Option<String> {
        read_marker(&self.paths_for(session_id).native_id)
    }

    /// Stores the backend-assigned id. Returns `false` without touching the
    /// file when one is already recorded.
    pub fn record_native_id(
        &self,
        session_id: &SessionId,
        native_id: &str,
    ) -> Result<bool, AgentError> {
        let path = self.paths_for(session_id).native_id;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(AgentError::storage(path, e)),
        };
        file.write_all(native_id.as_bytes())
            .map_err(|e| AgentError::storage(path, e))?;
        Ok(true)
    }

    /// First line of the backend marker, i.e. the backend name.
    pub fn read_backend(&self, session_id: &SessionId) -> Option<String> {
        read_marker(&self.paths_for(session_id).backend)
            .and_then(|s| s.lines().next().map(str::trim).map(ToOwned::to_owned))
            .filter(|s| !s.is_empty())
    }

    pub fn write_backend(
        &self,
        session_id: &SessionId,
        backend: &str,
        launched_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), AgentError> {
        let path = self.paths_for(session_id).backend;
        fs::write(&path, format!("{backend}\n{}\n", launched_at.to_rfc3339()))
            .map_err(|e| AgentError::storage(path, e))
    }
}

fn read_marker(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Unreadable session marker: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
