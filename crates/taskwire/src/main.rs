use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use taskwire::{
    build_manager, prepare_launch, prepare_resume, sync_configured_prompts, wrap_prompt,
    CommandResult,
};
use tw_agent::{AgentError, SessionId};
use tw_config::{ConfigPaths, LauncherConfig};

#[derive(Parser)]
#[command(
    name = "taskwire",
    version = taskwire::TASKWIRE_VERSION,
    about = "Launch and track detached coding-agent sessions"
)]
struct Cli {
    /// Project root holding taskwire.toml, logs/ and workdir/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new agent session in the background
    Launch {
        /// Ask the worker to write its answer to answers/<OUTPUT>.md
        #[arg(short = 'o', long)]
        output: Option<String>,
        /// Ask the worker to write an SOP to sop/<SOP>.md
        #[arg(short = 's', long)]
        sop: Option<String>,
        /// Backend to launch (defaults to the configured agent)
        #[arg(long)]
        backend: Option<String>,
        prompt: String,
    },
    /// Continue an existing session with a follow-up prompt
    Resume {
        session_id: String,
        #[arg(short = 'o', long)]
        output: Option<String>,
        #[arg(short = 's', long)]
        sop: Option<String>,
        prompt: String,
    },
    /// Report running/done/not_found for each session
    Status {
        #[arg(required = true)]
        session_ids: Vec<String>,
    },
    /// Block until any session finishes, then report all of them
    Wait {
        /// Give up after this many seconds (defaults to wait.timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
        session_ids: Vec<String>,
    },
    /// List registered backends and whether they are installed
    Backends,
    /// Copy prompts/MASTER.md and prompts/WORKER.md into place
    SyncPrompts,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn parse_ids(raw: &[String]) -> anyhow::Result<Vec<SessionId>> {
    raw.iter()
        .map(|id| SessionId::parse(id).map_err(anyhow::Error::from))
        .collect()
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = match cli.root {
        Some(root) => ConfigPaths::with_base(root),
        None => ConfigPaths::from_current_dir()?,
    };
    let mut config = LauncherConfig::load_from(&paths)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    let manager = build_manager(&config)?;

    match cli.command {
        Commands::Launch {
            output,
            sop,
            backend,
            prompt,
        } => {
            let backend = prepare_launch(
                &manager,
                &config,
                backend.as_deref(),
                output.as_deref(),
                sop.as_deref(),
            )?;
            let wrapped = wrap_prompt(&prompt, output.as_deref(), sop.as_deref());
            let outcome = manager.launch_with(&backend, &wrapped).await?;
            print_json(&CommandResult::new(
                outcome,
                manager.store(),
                output.as_deref(),
                sop.as_deref(),
            ))
        }
        Commands::Resume {
            session_id,
            output,
            sop,
            prompt,
        } => {
            let session_id = SessionId::parse(&session_id)?;
            prepare_resume(
                &manager,
                &config,
                &session_id,
                output.as_deref(),
                sop.as_deref(),
            )?;
            let wrapped = wrap_prompt(&prompt, output.as_deref(), sop.as_deref());
            let outcome = manager.resume(&session_id, &wrapped).await?;
            print_json(&CommandResult::new(
                outcome,
                manager.store(),
                output.as_deref(),
                sop.as_deref(),
            ))
        }
        Commands::Status { session_ids } => {
            let ids = parse_ids(&session_ids)?;
            if let [only] = ids.as_slice() {
                print_json(&manager.status(only))
            } else {
                print_json(&tw_agent::status::snapshot(manager.store(), &ids))
            }
        }
        Commands::Wait {
            timeout,
            session_ids,
        } => {
            let ids = parse_ids(&session_ids)?;
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.wait.timeout());
            tracing::info!(
                sessions = ids.len(),
                timeout_secs = timeout.as_secs(),
                "Waiting for sessions"
            );
            print_json(&manager.wait(&ids, timeout).await)
        }
        Commands::Backends => print_json(&manager.available_backends()),
        Commands::SyncPrompts => print_json(&sync_configured_prompts(&config)?),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskwire=info,tw_agent=info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let code = err
            .downcast_ref::<AgentError>()
            .map(AgentError::error_code)
            .unwrap_or("ERROR");
        eprintln!("error[{code}]: {err:#}");
        std::process::exit(1);
    }
}
