use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Unknown backend: {name} (registered: {registered})")]
    UnknownBackend { name: String, registered: String },
    #[error("Storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to launch {program}: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Session {0} has no backend identifier to resume with")]
    ResumeIdentifierMissing(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),
}

impl AgentError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for result records.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownBackend { .. } => "UNKNOWN_BACKEND",
            Self::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            Self::LaunchFailed { .. } => "LAUNCH_FAILED",
            Self::ResumeIdentifierMissing(_) => "RESUME_IDENTIFIER_MISSING",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::InvalidSessionId(_) => "INVALID_SESSION_ID",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
