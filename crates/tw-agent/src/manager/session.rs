use crate::error::AgentError;
use crate::process::{is_process_alive, launch_process, resume_process};
use crate::runners::Backend;
use crate::store::SessionId;
use serde::Serialize;

use super::AgentManager;

/// Written to the log ahead of each resumed process's output.
pub const RESUME_SEPARATOR: &str = "\n\n# --- resume ---\n\n";

/// What a launch or resume hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchOutcome {
    pub session_id: SessionId,
    pub backend: String,
    pub pid: u32,
    pub log: String,
    /// Id the backend chose for itself. Only self-identifying backends
    /// have one; `None` for them means the handshake did not find it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_id: Option<String>,
    pub resumable: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AgentManager {
    /// Launch the configured default backend.
    pub async fn launch(&self, prompt: &str) -> Result<LaunchOutcome, AgentError> {
        let backend = self.default_backend.clone();
        self.launch_with(&backend, prompt).await
    }

    /// Start a new session on `backend_name`. Returns once the process is
    /// spawned and, for self-identifying backends, once the handshake has
    /// either found the backend's id or used up its budget.
    pub async fn launch_with(
        &self,
        backend_name: &str,
        prompt: &str,
    ) -> Result<LaunchOutcome, AgentError> {
        let backend = self.registry.get(backend_name)?;
        self.store.ensure_directories()?;

        let session_id = SessionId::allocate();
        let paths = self.store.paths_for(&session_id);
        let argv = backend.launch_command(session_id.as_str(), prompt);

        let pid = launch_process(&argv, &paths.log, self.store.workdir())?;
        let started_at = chrono::Utc::now();
        self.store
            .write_pid(&session_id, pid)
            .and_then(|()| self.store.write_backend(&session_id, &backend.name, started_at))
            .inspect_err(|err| warn_unrecorded(&session_id, pid, err))?;

        tracing::info!(
            session_id = %session_id,
            backend = %backend.name,
            pid,
            "Agent session launched",
        );

        let native_id = if backend.self_identifying {
            self.resolve_native_id(&session_id, backend).await?
        } else {
            None
        };

        Ok(LaunchOutcome {
            resumable: !backend.self_identifying || native_id.is_some(),
            log: self.store.display_path(&paths.log),
            session_id,
            backend: backend.name.clone(),
            pid,
            native_id,
            started_at,
        })
    }

    async fn resolve_native_id(
        &self,
        session_id: &SessionId,
        backend: &Backend,
    ) -> Result<Option<String>, AgentError> {
        let log = self.store.paths_for(session_id).log;
        match self.options.handshake.detect(&log).await {
            Some(native_id) => {
                self.store.record_native_id(session_id, &native_id)?;
                tracing::info!(
                    session_id = %session_id,
                    native_id = %native_id,
                    "Backend session id resolved",
                );
                Ok(Some(native_id))
            }
            None => {
                tracing::warn!(
                    session_id = %session_id,
                    backend = %backend.name,
                    budget_ms = self.options.handshake.budget().as_millis() as u64,
                    "Handshake timed out before the backend printed its session id",
                );
                Ok(None)
            }
        }
    }

    /// Continue `session_id` with a follow-up prompt. The new process
    /// appends to the same log after a separator line and replaces the
    /// recorded pid.
    pub async fn resume(
        &self,
        session_id: &SessionId,
        prompt: &str,
    ) -> Result<LaunchOutcome, AgentError> {
        self.store.ensure_directories()?;
        if !self.store.has_pid_marker(session_id) {
            return Err(AgentError::SessionNotFound(session_id.to_string()));
        }

        let backend_name = self
            .store
            .read_backend(session_id)
            .unwrap_or_else(|| self.default_backend.clone());
        let backend = self.registry.get(&backend_name)?;
        let paths = self.store.paths_for(session_id);

        if let Some(previous) = self.store.read_pid(session_id).filter(|p| is_process_alive(*p)) {
            tracing::warn!(
                session_id = %session_id,
                pid = previous,
                "Resuming while the previous process is still running",
            );
        }

        let (resume_id, native_id) = if backend.self_identifying {
            let native_id = self.stored_or_late_native_id(session_id)?;
            (native_id.clone(), Some(native_id))
        } else {
            (session_id.to_string(), None)
        };

        let argv = backend.resume_command(&resume_id, prompt);
        let pid = resume_process(&argv, &paths.log, RESUME_SEPARATOR, self.store.workdir())?;
        let started_at = chrono::Utc::now();
        self.store
            .write_pid(session_id, pid)
            .inspect_err(|err| warn_unrecorded(session_id, pid, err))?;

        tracing::info!(
            session_id = %session_id,
            backend = %backend.name,
            pid,
            "Agent session resumed",
        );

        Ok(LaunchOutcome {
            session_id: session_id.clone(),
            backend: backend.name.clone(),
            pid,
            log: self.store.display_path(&paths.log),
            native_id,
            resumable: true,
            started_at,
        })
    }

    /// The recorded native id, or one found by a single pass over the log
    /// for backends that printed it after the launch handshake gave up.
    fn stored_or_late_native_id(&self, session_id: &SessionId) -> Result<String, AgentError> {
        if let Some(native_id) = self.store.read_native_id(session_id) {
            return Ok(native_id);
        }
        let log = self.store.paths_for(session_id).log;
        let Some(native_id) = self.options.handshake.scan_log(&log) else {
            return Err(AgentError::ResumeIdentifierMissing(session_id.to_string()));
        };
        self.store.record_native_id(session_id, &native_id)?;
        tracing::info!(
            session_id = %session_id,
            native_id = %native_id,
            "Backend session id recovered from log at resume",
        );
        Ok(native_id)
    }
}

/// The process is already running detached; make sure its pid is not lost.
fn warn_unrecorded(session_id: &SessionId, pid: u32, err: &AgentError) {
    tracing::warn!(
        session_id = %session_id,
        pid,
        error = %err,
        "Process started but its markers could not be written; it is running untracked",
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
