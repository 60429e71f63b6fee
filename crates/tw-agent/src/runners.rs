use crate::error::AgentError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Builds the arguments (program excluded) for a launch or resume.
///
/// The first parameter is the session identifier (caller-chosen on launch,
/// the resume identifier on resume); the second is the prompt, passed
/// through verbatim as a single argument.
pub type ArgsBuilder = fn(&str, &str) -> Vec<String>;

/// One registered agent backend. Plain data: a program, two argument
/// builders and whether the backend picks its own session id.
#[derive(Clone)]
pub struct Backend {
    pub name: String,
    pub display_name: String,
    pub program: String,
    pub launch_args: ArgsBuilder,
    pub resume_args: ArgsBuilder,
    /// The backend ignores our session id and prints its own, which must be
    /// scraped from the log before the session can be resumed.
    pub self_identifying: bool,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("self_identifying", &self.self_identifying)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Full argv for a fresh launch.
    pub fn launch_command(&self, session_id: &str, prompt: &str) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend((self.launch_args)(session_id, prompt));
        argv
    }

    /// Full argv to continue the session known to the backend as `resume_id`.
    pub fn resume_command(&self, resume_id: &str, prompt: &str) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend((self.resume_args)(resume_id, prompt));
        argv
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn is_installed(&self) -> bool {
        is_command_available(&self.program)
    }

    pub fn detect_version(&self) -> Option<String> {
        detect_version_from_command(&self.program, &["--version"])
    }
}

fn codex_launch_args(_session_id: &str, prompt: &str) -> Vec<String> {
    [
        "-a",
        "never",
        "exec",
        "-s",
        "danger-full-access",
        "--skip-git-repo-check",
        prompt,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn codex_resume_args(resume_id: &str, prompt: &str) -> Vec<String> {
    [
        "-a",
        "never",
        "exec",
        "--skip-git-repo-check",
        "-s",
        "danger-full-access",
        "resume",
        resume_id,
        prompt,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn claude_launch_args(session_id: &str, prompt: &str) -> Vec<String> {
    [
        "-p",
        prompt,
        "--session-id",
        session_id,
        "--dangerously-skip-permissions",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn claude_resume_args(resume_id: &str, prompt: &str) -> Vec<String> {
    [
        "-p",
        prompt,
        "--resume",
        resume_id,
        "--dangerously-skip-permissions",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn codex_backend() -> Backend {
    Backend {
        name: "codex".to_string(),
        display_name: "Codex".to_string(),
        program: "codex".to_string(),
        launch_args: codex_launch_args,
        resume_args: codex_resume_args,
        self_identifying: true,
    }
}

pub fn claude_backend() -> Backend {
    Backend {
        name: "claude".to_string(),
        display_name: "Claude Code".to_string(),
        program: "claude".to_string(),
        launch_args: claude_launch_args,
        resume_args: claude_resume_args,
        self_identifying: false,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableBackend {
    pub name: String,
    pub display_name: String,
    pub program: String,
    pub self_identifying: bool,
    pub installed: bool,
    pub version: Option<String>,
}

/// Backends keyed by name.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two built-in backends: `codex` (self-identifying) and `claude`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(codex_backend());
        registry.register(claude_backend());
        registry
    }

    /// Adds or replaces a backend under its own name.
    pub fn register(&mut self, backend: Backend) {
        self.backends.insert(backend.name.clone(), backend);
    }

    /// Points a registered backend at a different executable. Returns
    /// `false` when no backend of that name exists.
    pub fn override_program(&mut self, name: &str, program: &str) -> bool {
        match self.backends.get_mut(name) {
            Some(backend) => {
                backend.program = program.to_string();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Result<&Backend, AgentError> {
        self.backends
            .get(name)
            .ok_or_else(|| AgentError::UnknownBackend {
                name: name.to_string(),
                registered: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn available(&self) -> Vec<AvailableBackend> {
        self.backends
            .values()
            .map(|backend| {
                let installed = backend.is_installed();
                AvailableBackend {
                    name: backend.name.clone(),
                    display_name: backend.display_name.clone(),
                    program: backend.program.clone(),
                    self_identifying: backend.self_identifying,
                    installed,
                    version: installed.then(|| backend.detect_version()).flatten(),
                }
            })
            .collect()
    }
}

pub fn detect_version_from_command(binary: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(binary)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .map(|s| extract_version(&s))
}

pub fn is_command_available(binary: &str) -> bool {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        return std::path::Path::new(binary).is_file();
    }
    std::process::Command::new("which")
        .arg(binary)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn extract_version(s: &str) -> String {
    s.split_whitespace()
        .find(|w| w.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .unwrap_or(s)
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
