//! Shared helpers and result types used by the `taskwire` binary.

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tw_agent::{
    AgentError, AgentManager, BackendRegistry, HandshakePolicy, LaunchOutcome, ManagerOptions,
    SessionId, SessionStore,
};
use tw_config::LauncherConfig;

/// Build-time version string.
///
/// When `TASKWIRE_VERSION` is provided in the build environment (for example
/// by release workflows), that value is used. Otherwise we fall back to the
/// crate package version.
pub const TASKWIRE_VERSION: &str = match option_env!("TASKWIRE_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// Instruction files every agent CLI looks for in its working directory.
pub const INSTRUCTION_FILE_NAMES: [&str; 3] = ["AGENTS.md", "GEMINI.md", "CLAUDE.md"];

pub const ANSWERS_DIR: &str = "answers";
pub const SOP_DIR: &str = "sop";

// ---------------------------------------------------------------------------
// Manager construction
// ---------------------------------------------------------------------------

/// Wires the registry, session store and poll timings from a loaded config.
pub fn build_manager(config: &LauncherConfig) -> anyhow::Result<AgentManager> {
    let paths = config.paths()?;

    let mut registry = BackendRegistry::with_defaults();
    for name in config.backends.keys() {
        let Some(program) = config.program_override(name) else {
            continue;
        };
        if !registry.override_program(name, program) {
            tracing::warn!(backend = %name, "Program override for unregistered backend ignored");
        }
    }

    let store = SessionStore::new(
        paths.root().to_path_buf(),
        config.logs_path()?,
        config.meta_path()?,
        config.workdir_path()?,
    );
    let handshake = HandshakePolicy::new(
        &config.handshake.pattern,
        config.handshake.poll_interval(),
        config.handshake.max_attempts,
    )
    .context("Invalid handshake pattern")?;
    let options = ManagerOptions::new(handshake, config.wait.poll_interval());

    Ok(AgentManager::new(registry, store, config.agent.clone(), options))
}

// ---------------------------------------------------------------------------
// Prompt wrapping
// ---------------------------------------------------------------------------

const SOP_HINT: &str =
    "If the sop/ directory contains an SOP relevant to this task, read it first and follow it.\n\n";

const OUTPUT_QUALITY_PREAMBLE: &str = "\
Output requirements (these constrain the final answer only):
- Do not print your chain of thought or internal reasoning.
- The final answer must be detailed and fit the kind of task. Do not pad it with generic \"next steps\".
- Code walkthroughs: explain the code section by section (key functions, branches, data flow, edge cases), quoting short snippets where useful.
- Larger changes across several places: for every file, say what changed, why, and how behaviour differs before and after, with before/after snippets or the full diff.
- Small changes: still explain the scope of impact and the behaviour change.
";

fn answer_block(output_name: &str) -> String {
    format!(
        "
[Output - mandatory]
When the task is finished, write your answer to `{ANSWERS_DIR}/{output_name}.md`.

The answer must be complete:
- Code analysis: explain key logic, data flow and edge cases, quoting key snippets
- Code changes: go file by file through what changed and why, with a diff
- Searches: list every matching location with a short note

Never answer with a bare conclusion and no supporting detail.

"
    )
}

fn sop_block(sop_name: &str) -> String {
    format!(
        "
[SOP output]
Write the SOP to `{SOP_DIR}/{sop_name}.md` in this shape:

# [SOP title]

## When to use
[the situations this SOP covers]

## Steps
1. ...
2. ...

## Caveats
- ...

"
    )
}

/// Prepends the standard worker instructions to a raw task prompt.
pub fn wrap_prompt(task: &str, output_name: Option<&str>, sop_name: Option<&str>) -> String {
    let mut prompt = String::from(SOP_HINT);
    if let Some(name) = output_name {
        prompt.push_str(&answer_block(name));
    }
    if let Some(name) = sop_name {
        prompt.push_str(&sop_block(name));
    }
    prompt.push_str(OUTPUT_QUALITY_PREAMBLE);
    prompt.push_str("\n\nTask:\n");
    prompt.push_str(task);
    prompt.push('\n');
    prompt
}

/// Rejects names that would escape the answers/sop directories.
pub fn validate_output_name(name: &str) -> anyhow::Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        anyhow::bail!("Invalid output name {name:?}: must be a plain file name without .md");
    }
    Ok(())
}

/// Creates `<workdir>/answers` and `<workdir>/sop`.
pub fn ensure_output_dirs(workdir: &Path) -> anyhow::Result<()> {
    for dir in [ANSWERS_DIR, SOP_DIR] {
        let path = workdir.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Launch / resume preparation
// ---------------------------------------------------------------------------

/// Checks everything a launch can reject up front, then syncs prompt files
/// and creates the output directories. Returns the backend name to launch.
pub fn prepare_launch(
    manager: &AgentManager,
    config: &LauncherConfig,
    backend: Option<&str>,
    output_name: Option<&str>,
    sop_name: Option<&str>,
) -> anyhow::Result<String> {
    check_output_names(output_name, sop_name)?;
    let name = backend.unwrap_or(manager.default_backend());
    let backend = manager.registry().get(name)?;
    prepare_workdir(manager, config)?;
    Ok(backend.name.clone())
}

/// Resume counterpart of [`prepare_launch`]: the session must exist before
/// anything is written.
pub fn prepare_resume(
    manager: &AgentManager,
    config: &LauncherConfig,
    session_id: &SessionId,
    output_name: Option<&str>,
    sop_name: Option<&str>,
) -> anyhow::Result<()> {
    check_output_names(output_name, sop_name)?;
    if !manager.store().has_pid_marker(session_id) {
        return Err(AgentError::SessionNotFound(session_id.to_string()).into());
    }
    prepare_workdir(manager, config)
}

fn check_output_names(output_name: Option<&str>, sop_name: Option<&str>) -> anyhow::Result<()> {
    for name in [output_name, sop_name].into_iter().flatten() {
        validate_output_name(name)?;
    }
    Ok(())
}

fn prepare_workdir(manager: &AgentManager, config: &LauncherConfig) -> anyhow::Result<()> {
    sync_prompts_quietly(config);
    ensure_output_dirs(manager.store().workdir())
}

/// [`sync_prompts`] with the root, prompts and worker directories from
/// `config`.
pub fn sync_configured_prompts(config: &LauncherConfig) -> anyhow::Result<SyncReport> {
    let paths = config.paths()?;
    sync_prompts(paths.root(), &config.prompts_path()?, &config.workdir_path()?)
}

/// Prompt sync before launch/resume is logged, never fatal.
fn sync_prompts_quietly(config: &LauncherConfig) {
    match sync_configured_prompts(config) {
        Ok(report) => tracing::debug!(
            copied = report.copied.len(),
            missing = report.missing.len(),
            "Prompt files synced"
        ),
        Err(err) => tracing::warn!(error = %format!("{err:#}"), "Prompt sync failed; continuing"),
    }
}

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Launch/resume record printed by the CLI: the session outcome plus where
/// the worker was asked to put its answer and SOP.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    #[serde(flatten)]
    pub outcome: LaunchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sop: Option<String>,
}

impl CommandResult {
    pub fn new(
        outcome: LaunchOutcome,
        store: &SessionStore,
        output_name: Option<&str>,
        sop_name: Option<&str>,
    ) -> Self {
        let in_workdir = |dir: &str, name: &str| {
            store.display_path(&store.workdir().join(dir).join(format!("{name}.md")))
        };
        Self {
            answer: output_name.map(|name| in_workdir(ANSWERS_DIR, name)),
            sop: sop_name.map(|name| in_workdir(SOP_DIR, name)),
            outcome,
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt file sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub copied: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

/// Copies `MASTER.md` into the project root and `WORKER.md` into the worker
/// directory, under each of [`INSTRUCTION_FILE_NAMES`]. A missing source is
/// reported, not an error.
pub fn sync_prompts(root: &Path, prompts_dir: &Path, workdir: &Path) -> anyhow::Result<SyncReport> {
    fs::create_dir_all(workdir)
        .with_context(|| format!("Failed to create {}", workdir.display()))?;

    let mut report = SyncReport::default();
    for (source, target_dir) in [
        (prompts_dir.join("MASTER.md"), root),
        (prompts_dir.join("WORKER.md"), workdir),
    ] {
        if !source.is_file() {
            tracing::warn!(source = %source.display(), "Prompt source not found; skipping");
            report.missing.push(source);
            continue;
        }
        for name in INSTRUCTION_FILE_NAMES {
            let dest = target_dir.join(name);
            fs::copy(&source, &dest).with_context(|| {
                format!("Failed to copy {} to {}", source.display(), dest.display())
            })?;
            tracing::debug!(source = %source.display(), dest = %dest.display(), "Prompt copied");
            report.copied.push(dest);
        }
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
