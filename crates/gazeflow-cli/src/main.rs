mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gazeflow",
    about = "Run and track the processing pipeline of an eye-tracking study",
    version,
    propagate_version = true
)]
struct Cli {
    /// Study root (default: nearest directory upward containing study.yaml)
    #[arg(long, global = true, env = "GAZEFLOW_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show action states of all sessions, or of one session in detail
    Status {
        /// Session name (omit to list every session)
        session: Option<String>,
    },

    /// Show which actions can run now in a session, and what blocks the rest
    Possible {
        session: String,

        /// Only evaluate these actions (repeatable)
        #[arg(long = "action", value_name = "ACTION")]
        actions: Vec<String>,
    },

    /// Run an action and wait for the outcome
    Run {
        action: String,
        session: String,

        /// Recording to run on (repeatable). Omit to run a recording action
        /// on every recording where it is runnable now.
        #[arg(long = "recording", value_name = "NAME")]
        recordings: Vec<String>,
    },

    /// Force an action back to not_run, resetting everything that depends on it
    Reset {
        action: String,
        session: String,

        /// Recording, for recording-scoped actions
        #[arg(long)]
        recording: Option<String>,
    },

    /// Settle states left by an interrupted run (running -> failed, pending -> not_run)
    Recover,

    /// Rewrite state files written by an older action catalog
    Upgrade,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Status { session } => cmd::status::run(&root, session.as_deref(), cli.json),
        Commands::Possible { session, actions } => {
            cmd::possible::run(&root, &session, &actions, cli.json)
        }
        Commands::Run {
            action,
            session,
            recordings,
        } => cmd::run::run(&root, &action, &session, &recordings, cli.json),
        Commands::Reset {
            action,
            session,
            recording,
        } => cmd::reset::run(&root, &action, &session, recording.as_deref(), cli.json),
        Commands::Recover => cmd::recover::run(&root, cli.json),
        Commands::Upgrade => cmd::upgrade::run(&root, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
