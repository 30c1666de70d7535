mod cmd_doctor;
mod cmd_hook;
mod cmd_hooks;
mod cmd_init;
mod cmd_run;
mod cmd_session;
mod cmd_sessions;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use infratrack_policy::Policy;
use infratrack_store::{JsonStore, StoreError};
use output::Ui;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Overrides the per-user store root.
const HOME_ENV: &str = "INFRATRACK_HOME";
/// Log filter for diagnostics on stderr, e.g. `INFRATRACK_LOG=debug`.
const LOG_ENV: &str = "INFRATRACK_LOG";

#[derive(Parser)]
#[command(
    name = "infratrack",
    version,
    about = "Record infrastructure work sessions as sanitized runbooks"
)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize local storage and the default config
    #[command(visible_alias = "i")]
    Init,
    /// Start a recording session
    #[command(visible_alias = "s")]
    Start {
        /// Session title
        title: String,
        /// Optional environment label (e.g. staging, prod)
        #[arg(short, long)]
        env: Option<String>,
    },
    /// Stop the active session and append it to the log
    #[command(visible_alias = "stp")]
    Stop,
    /// Show whether a session is recording
    Status,
    /// Execute a command and record its sanitized metadata
    #[command(visible_alias = "r")]
    Run {
        /// Do not execute commands that match the denylist
        #[arg(long)]
        block_denied: bool,
        /// Command and arguments (after --)
        #[arg(last = true, required = true)]
        argv: Vec<String>,
    },
    /// Browse completed sessions
    Sessions {
        #[command(subcommand)]
        cmd: SessionsCmd,
    },
    /// Shell hook entrypoints
    #[command(hide = true)]
    Hook {
        #[command(subcommand)]
        cmd: HookCmd,
    },
    /// Manage hooks recording mode
    Hooks {
        #[command(subcommand)]
        cmd: HooksCmd,
    },
    /// Run local diagnostics for the store and PATH
    Doctor,
}

#[derive(Subcommand)]
enum SessionsCmd {
    /// List completed sessions, newest first
    List {
        /// Maximum sessions to show (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Show one session by id, or `last`
    Show {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HookCmd {
    /// Record one command reported by a shell hook
    Record {
        /// Raw command line
        #[arg(long, allow_hyphen_values = true)]
        command: String,
        /// Exit code of the command
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        exit_code: String,
        /// Duration in milliseconds
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        duration_ms: i64,
        /// Working directory of the command
        #[arg(long, default_value = "")]
        cwd: String,
        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        timestamp: Option<String>,
    },
}

#[derive(Subcommand)]
enum HooksCmd {
    /// Enable hooks mode
    Enable,
    /// Disable hooks mode
    Disable,
    /// Show hooks mode state
    Status,
    /// Configure hooks mode settings
    #[command(visible_alias = "config")]
    Configure {
        /// Print a reminder every N recorded commands
        #[arg(long)]
        remind_every: u32,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let ui = Ui::new(cli.no_color);
    let code = match dispatch(cli.cmd, ui) {
        Ok(code) => code,
        Err(e) => {
            ui.error(format!("{e:#}"));
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn store_root() -> PathBuf {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(infratrack_store::default_root)
}

/// Run a subcommand and return the process exit code.
fn dispatch(cmd: Command, ui: Ui) -> anyhow::Result<i32> {
    let store = JsonStore::new(store_root());
    tracing::debug!(root = %store.paths().root.display(), "using store");

    match cmd {
        Command::Init => cmd_init::execute(&store, ui)?,
        Command::Start { title, env } => cmd_session::start(&store, &title, env.as_deref(), ui)?,
        Command::Stop => cmd_session::stop(&store, ui)?,
        Command::Status => cmd_session::status(&store)?,
        Command::Run { block_denied, argv } => {
            return cmd_run::execute(&store, &argv, block_denied, ui)
        }
        Command::Sessions { cmd } => match cmd {
            SessionsCmd::List { limit } => cmd_sessions::list(&store, limit)?,
            SessionsCmd::Show { id, json } => cmd_sessions::show(&store, &id, json)?,
        },
        Command::Hook { cmd } => match cmd {
            HookCmd::Record {
                command,
                exit_code,
                duration_ms,
                cwd,
                timestamp,
            } => cmd_hook::record(
                &store,
                &cmd_hook::RecordArgs {
                    command: &command,
                    exit_code: &exit_code,
                    duration_ms,
                    cwd: &cwd,
                    timestamp: timestamp.as_deref(),
                },
            )?,
        },
        Command::Hooks { cmd } => match cmd {
            HooksCmd::Enable => cmd_hooks::set_enabled(&store, true, ui)?,
            HooksCmd::Disable => cmd_hooks::set_enabled(&store, false, ui)?,
            HooksCmd::Status => cmd_hooks::status(&store)?,
            HooksCmd::Configure { remind_every } => {
                cmd_hooks::configure(&store, remind_every, ui)?
            }
        },
        Command::Doctor => cmd_doctor::execute(&store, ui)?,
    }
    Ok(0)
}

/// Policy from the store's config. A broken config must not stop recording,
/// so it degrades to the defaults with a warning.
pub(crate) fn load_policy(store: &JsonStore) -> Policy {
    let path = &store.paths().config_yaml;
    match Policy::load_or_default(path) {
        Ok(policy) => policy,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to load policy config, using defaults");
            Policy::default()
        }
    }
}

/// Turn the store errors a user can act on into instructions.
pub(crate) fn explain(err: StoreError) -> anyhow::Error {
    match err {
        StoreError::NotInitialized => {
            anyhow::anyhow!("InfraTrack is not initialized. Run `infratrack init` first")
        }
        StoreError::NoActiveSession => {
            anyhow::anyhow!("no active session. Start one with `infratrack start \"<title>\"`")
        }
        StoreError::ActiveSessionExists => anyhow::anyhow!(
            "a session is already active. Run `infratrack stop` before starting a new one"
        ),
        StoreError::NoSessions => anyhow::anyhow!("no completed sessions yet"),
        StoreError::LockTimeout { path, .. } => anyhow::anyhow!(
            "store is locked by another process. If none is running, remove {}",
            path.display()
        ),
        other => other.into(),
    }
}
