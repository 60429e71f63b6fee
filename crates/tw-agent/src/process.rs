use crate::error::AgentError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogMode {
    /// Fresh launch: start from an empty log.
    Truncate,
    /// Resume: keep everything earlier invocations wrote.
    Append,
}

fn open_log(path: &Path, mode: LogMode) -> Result<File, AgentError> {
    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        LogMode::Truncate => options.write(true).truncate(true),
        LogMode::Append => options.append(true),
    };
    options
        .open(path)
        .map_err(|e| AgentError::storage(path, e))
}

/// Spawns `argv` detached from our session with stdout and stderr going to
/// a fresh `log_path` and stdin closed. Returns as soon as the OS hands back
/// a pid; the child is never waited on or signalled.
pub fn launch_process(argv: &[String], log_path: &Path, cwd: &Path) -> Result<u32, AgentError> {
    let log = open_log(log_path, LogMode::Truncate)?;
    spawn_detached(argv, &log, log_path, cwd)
}

/// Like [`launch_process`], but appends to `log_path` after writing
/// `separator`. If the spawn fails the log is cut back to its prior length,
/// so only earlier output remains.
pub fn resume_process(
    argv: &[String],
    log_path: &Path,
    separator: &str,
    cwd: &Path,
) -> Result<u32, AgentError> {
    let mut log = open_log(log_path, LogMode::Append)?;
    let prior_len = log
        .metadata()
        .map_err(|e| AgentError::storage(log_path, e))?
        .len();
    log.write_all(separator.as_bytes())
        .and_then(|()| log.flush())
        .map_err(|e| AgentError::storage(log_path, e))?;

    spawn_detached(argv, &log, log_path, cwd).inspect_err(|_| {
        if let Err(e) = log.set_len(prior_len) {
            tracing::warn!(log = %log_path.display(), "Failed to roll back resume separator: {e}");
        }
    })
}

fn spawn_detached(
    argv: &[String],
    log: &File,
    log_path: &Path,
    cwd: &Path,
) -> Result<u32, AgentError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(AgentError::LaunchFailed {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let stdout = log
        .try_clone()
        .map_err(|e| AgentError::storage(log_path, e))?;
    let stderr = log
        .try_clone()
        .map_err(|e| AgentError::storage(log_path, e))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: pre-exec runs in the forked child before exec; setsid is
        // async-signal-safe.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn().map_err(|e| AgentError::LaunchFailed {
        program: program.clone(),
        source: e,
    })?;
    let pid = child.id();
    tracing::debug!(pid, program = %program, cwd = %cwd.display(), "Spawned detached process");
    Ok(pid)
}

/// Returns `true` when `pid` names a live (non-zombie) process.
///
/// A recycled pid reads as alive; nothing here can tell it apart from the
/// process that originally held it.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if raw_pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs permission and existence checks only.
        let rc = unsafe { libc::kill(raw_pid, 0) };
        let exists = rc == 0
            || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
        exists && !is_zombie(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The state field follows the parenthesised command name, which may
    // itself contain ')'.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .is_some_and(|state| state == "Z" || state == "X")
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(pid: u32) -> bool {
    Command::new("ps")
        .arg("-o")
        .arg("stat=")
        .arg("-p")
        .arg(pid.to_string())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|out| out.status.success())
        .is_some_and(|out| String::from_utf8_lossy(&out.stdout).trim().starts_with('Z'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
