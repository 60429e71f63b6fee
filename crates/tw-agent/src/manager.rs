pub(crate) mod session;

use crate::handshake::{
    HandshakePolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_PATTERN, DEFAULT_POLL_INTERVAL,
};
use crate::runners::{AvailableBackend, BackendRegistry};
use crate::status::{self, SessionStatus, DEFAULT_WAIT_POLL_INTERVAL};
use crate::store::{SessionId, SessionStore};
use std::collections::BTreeMap;
use std::time::Duration;

/// Timing knobs for the two poll loops.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub handshake: HandshakePolicy,
    pub wait_poll_interval: Duration,
}

impl ManagerOptions {
    pub fn new(handshake: HandshakePolicy, wait_poll_interval: Duration) -> Self {
        Self {
            handshake,
            wait_poll_interval,
        }
    }

    /// 250 ms x 40 handshake polls, 2 s wait polls, codex session marker.
    pub fn standard() -> Result<Self, regex::Error> {
        Ok(Self {
            handshake: HandshakePolicy::new(
                DEFAULT_PATTERN,
                DEFAULT_POLL_INTERVAL,
                DEFAULT_MAX_ATTEMPTS,
            )?,
            wait_poll_interval: DEFAULT_WAIT_POLL_INTERVAL,
        })
    }
}

/// Launches, resumes and reports on agent sessions.
///
/// Holds no per-session state in memory: everything lives in the
/// [`SessionStore`], so separate invocations of the tool see the same
/// sessions. Concurrent launch/resume calls for the same session id are not
/// coordinated.
pub struct AgentManager {
    pub(crate) registry: BackendRegistry,
    pub(crate) store: SessionStore,
    pub(crate) default_backend: String,
    pub(crate) options: ManagerOptions,
}

impl AgentManager {
    pub fn new(
        registry: BackendRegistry,
        store: SessionStore,
        default_backend: impl Into<String>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            registry,
            store,
            default_backend: default_backend.into(),
            options,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn default_backend(&self) -> &str {
        &self.default_backend
    }

    pub fn available_backends(&self) -> Vec<AvailableBackend> {
        self.registry.available()
    }

    pub fn status(&self, session_id: &SessionId) -> SessionStatus {
        status::session_status(&self.store, session_id)
    }

    /// Blocks until at least one of `session_ids` is done (or none is
    /// running), or `timeout` passes, then reports all of them.
    pub async fn wait(
        &self,
        session_ids: &[SessionId],
        timeout: Duration,
    ) -> BTreeMap<SessionId, SessionStatus> {
        status::wait_for_any(
            &self.store,
            session_ids,
            self.options.wait_poll_interval,
            timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::SessionState;
    use std::path::Path;

    fn manager_in(dir: &Path) -> AgentManager {
        let store = SessionStore::new(
            dir.to_path_buf(),
            dir.join("logs"),
            dir.join("meta"),
            dir.join("workdir"),
        );
        AgentManager::new(
            BackendRegistry::with_defaults(),
            store,
            "codex",
            ManagerOptions::standard().unwrap(),
        )
    }

    #[test]
    fn standard_options() {
        let options = ManagerOptions::standard().unwrap();
        assert_eq!(options.handshake.poll_interval, Duration::from_millis(250));
        assert_eq!(options.handshake.max_attempts, 40);
        assert_eq!(options.wait_poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn accessors_expose_construction_values() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        assert_eq!(manager.default_backend(), "codex");
        assert_eq!(manager.registry().names(), vec!["claude", "codex"]);
        assert_eq!(manager.store().workdir(), dir.path().join("workdir"));
    }

    #[test]
    fn status_of_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        let status = manager.status(&SessionId::allocate());
        assert_eq!(status.state, SessionState::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_on_unlaunched_session_returns_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        let id = SessionId::allocate();

        let started = std::time::Instant::now();
        let statuses = manager
            .wait(std::slice::from_ref(&id), Duration::from_secs(1))
            .await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[&id].state, SessionState::NotFound);
    }
}
