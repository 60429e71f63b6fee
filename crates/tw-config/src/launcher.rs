use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::paths::ConfigPaths;

/// Marker codex prints once it has picked its own session id.
pub const DEFAULT_HANDSHAKE_PATTERN: &str = r"session id: ([a-f0-9-]+)";

fn default_agent() -> String {
    "codex".to_string()
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_meta_dir() -> PathBuf {
    PathBuf::from("/tmp/agent_meta")
}

fn default_workdir() -> PathBuf {
    PathBuf::from("workdir")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_handshake_poll_interval_ms() -> u64 {
    250
}

fn default_handshake_max_attempts() -> u32 {
    40
}

fn default_handshake_pattern() -> String {
    DEFAULT_HANDSHAKE_PATTERN.to_string()
}

fn default_wait_poll_interval_ms() -> u64 {
    2000
}

fn default_wait_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_handshake_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_handshake_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_handshake_pattern")]
    pub pattern: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_handshake_poll_interval_ms(),
            max_attempts: default_handshake_max_attempts(),
            pattern: default_handshake_pattern(),
        }
    }
}

impl HandshakeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_wait_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_wait_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_wait_poll_interval_ms(),
            timeout_secs: default_wait_timeout_secs(),
        }
    }
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-backend overrides, keyed by backend name under `[backends.<name>]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendOverride {
    #[serde(default)]
    pub program: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_meta_dir")]
    pub meta_dir: PathBuf,
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub backends: BTreeMap<String, BackendOverride>,
    #[serde(skip)]
    paths: Option<ConfigPaths>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            logs_dir: default_logs_dir(),
            meta_dir: default_meta_dir(),
            workdir: default_workdir(),
            prompts_dir: default_prompts_dir(),
            handshake: HandshakeConfig::default(),
            wait: WaitConfig::default(),
            backends: BTreeMap::new(),
            paths: None,
        }
    }
}

impl LauncherConfig {
    /// Returns the `ConfigPaths` for this config. If paths haven't been set,
    /// falls back to the current directory.
    pub fn paths(&self) -> anyhow::Result<ConfigPaths> {
        match &self.paths {
            Some(p) => Ok(p.clone()),
            None => ConfigPaths::from_current_dir(),
        }
    }

    /// Set a custom `ConfigPaths` (useful for testing).
    pub fn set_paths(&mut self, paths: ConfigPaths) {
        self.paths = Some(paths);
    }

    /// Load config from a specific `ConfigPaths`.
    pub fn load_from(paths: &ConfigPaths) -> anyhow::Result<Self> {
        let config_file = paths.config_path();
        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)?;
            let config: LauncherConfig = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid {}: {e}", config_file.display()))?;
            config
        } else {
            Self::default()
        };
        config.paths = Some(paths.clone());
        config.validate()?;
        Ok(config)
    }

    /// Layer environment overrides on top of the file values.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests pass a map.
    /// Recognised keys: `AGENT_TYPE`, `WORKER_WORKDIR`, `TASKWIRE_META_DIR`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(agent) = lookup("AGENT_TYPE").filter(|v| !v.trim().is_empty()) {
            self.agent = agent.trim().to_ascii_lowercase();
        }
        if let Some(workdir) = lookup("WORKER_WORKDIR").filter(|v| !v.is_empty()) {
            self.workdir = PathBuf::from(workdir);
        }
        if let Some(meta) = lookup("TASKWIRE_META_DIR").filter(|v| !v.is_empty()) {
            self.meta_dir = PathBuf::from(meta);
        }
        self.validate()
    }

    /// Validate config values. Called automatically by `load_from`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent.trim().is_empty() {
            anyhow::bail!("agent must not be empty");
        }
        if self.handshake.poll_interval_ms == 0 {
            anyhow::bail!("handshake.poll_interval_ms must be greater than 0");
        }
        if self.handshake.max_attempts == 0 {
            anyhow::bail!("handshake.max_attempts must be greater than 0");
        }
        let pattern = regex::Regex::new(&self.handshake.pattern)
            .map_err(|e| anyhow::anyhow!("handshake.pattern is not a valid regex: {e}"))?;
        if pattern.captures_len() < 2 {
            anyhow::bail!("handshake.pattern must contain a capture group");
        }
        if self.wait.poll_interval_ms == 0 {
            anyhow::bail!("wait.poll_interval_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn logs_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.paths()?.resolve(&self.logs_dir))
    }

    pub fn meta_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.paths()?.resolve(&self.meta_dir))
    }

    pub fn workdir_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.paths()?.resolve(&self.workdir))
    }

    pub fn prompts_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.paths()?.resolve(&self.prompts_dir))
    }

    /// The program override for `backend`, if one is configured.
    pub fn program_override(&self, backend: &str) -> Option<&str> {
        self.backends
            .get(backend)
            .and_then(|b| b.program.as_deref())
            .filter(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    fn test_paths() -> (tempfile::TempDir, ConfigPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::with_base(dir.path().to_path_buf());
        (dir, paths)
    }

    #[test]
    fn default_produces_expected_values() {
        let config = LauncherConfig::default();
        assert_eq!(config.agent, "codex");
        assert_eq!(config.logs_dir, PathBuf::from("logs"));
        assert_eq!(config.meta_dir, PathBuf::from("/tmp/agent_meta"));
        assert_eq!(config.workdir, PathBuf::from("workdir"));
        assert_eq!(config.handshake.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.handshake.max_attempts, 40);
        assert_eq!(config.wait.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.wait.timeout(), Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_with_no_file_returns_default() {
        let (_dir, paths) = test_paths();
        let config = LauncherConfig::load_from(&paths).unwrap();
        assert_eq!(config.agent, "codex");
        assert_eq!(config.logs_path().unwrap(), paths.root().join("logs"));
    }

    #[test]
    fn load_with_partial_toml_fills_defaults() {
        let (_dir, paths) = test_paths();
        std::fs::write(
            paths.config_path(),
            "agent = \"claude\"\n[handshake]\nmax_attempts = 8\n",
        )
        .unwrap();
        let config = LauncherConfig::load_from(&paths).unwrap();
        assert_eq!(config.agent, "claude");
        assert_eq!(config.handshake.max_attempts, 8);
        assert_eq!(config.handshake.poll_interval_ms, 250);
        assert_eq!(config.handshake.pattern, DEFAULT_HANDSHAKE_PATTERN);
        assert_eq!(config.wait.timeout_secs, 600);
    }

    #[test]
    fn load_reads_backend_overrides() {
        let (_dir, paths) = test_paths();
        std::fs::write(
            paths.config_path(),
            "[backends.codex]\nprogram = \"/opt/bin/codex\"\n",
        )
        .unwrap();
        let config = LauncherConfig::load_from(&paths).unwrap();
        assert_eq!(config.program_override("codex"), Some("/opt/bin/codex"));
        assert_eq!(config.program_override("claude"), None);
    }

    #[test]
    fn load_with_invalid_toml_returns_error() {
        let (_dir, paths) = test_paths();
        std::fs::write(paths.config_path(), "not valid {{{{ toml").unwrap();
        assert!(LauncherConfig::load_from(&paths).is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut config = LauncherConfig::default();
        config.handshake.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = LauncherConfig::default();
        config.wait.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = LauncherConfig::default();
        config.handshake.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_patterns() {
        let mut config = LauncherConfig::default();
        config.handshake.pattern = "session id: (".to_string();
        assert!(config.validate().is_err());

        config.handshake.pattern = "session id: [a-f0-9-]+".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("capture group"));
    }

    #[test]
    fn apply_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("AGENT_TYPE", " Claude "),
            ("WORKER_WORKDIR", "sandbox"),
            ("TASKWIRE_META_DIR", "meta"),
        ]
        .into_iter()
        .collect();
        let mut config = LauncherConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.agent, "claude");
        assert_eq!(config.workdir, PathBuf::from("sandbox"));
        assert_eq!(config.meta_dir, PathBuf::from("meta"));
    }

    #[test]
    fn apply_env_ignores_empty_values() {
        let mut config = LauncherConfig::default();
        config
            .apply_env(|k| (k == "AGENT_TYPE").then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(config.agent, "codex");
    }

    #[test]
    fn relative_meta_dir_resolves_against_root() {
        let mut config = LauncherConfig::default();
        config.set_paths(ConfigPaths::with_base(PathBuf::from("/proj")));
        config.meta_dir = PathBuf::from(".meta");
        assert_eq!(config.meta_path().unwrap(), Path::new("/proj/.meta"));
        assert_eq!(config.workdir_path().unwrap(), Path::new("/proj/workdir"));
        assert_eq!(config.prompts_path().unwrap(), Path::new("/proj/prompts"));
    }

    #[test]
    fn toml_roundtrip() {
        let config = LauncherConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: LauncherConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.agent, config.agent);
        assert_eq!(deserialized.handshake.pattern, config.handshake.pattern);
        assert_eq!(deserialized.wait.timeout_secs, config.wait.timeout_secs);
    }
}
