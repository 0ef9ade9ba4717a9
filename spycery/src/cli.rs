use clap::{Args, Parser, Subcommand};
use spycery_core::config::LockMode;
use spycery_env::RefreshPolicy;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

use crate::observability::LogMode;

/// spycery - activate a Python virtual environment before running tools
#[derive(Parser, Debug)]
#[command(name = "spycery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding environments (default: from env or current directory)
    #[arg(long, global = true, value_name = "DIR", env = "SPYCERY_ENV_ROOT")]
    pub root: Option<PathBuf>,

    /// Log output: none, console (stderr) or file (stderr plus <log dir>/<log name>.log)
    #[arg(long, global = true, value_enum)]
    pub log_mode: Option<LogMode>,

    /// Log file name without extension, used with --log-mode file
    #[arg(long, global = true, default_value = "results")]
    pub log_name: String,

    /// Verbosity of activation records: off, error, warn, info, debug, trace
    #[arg(long, global = true, value_parser = parse_level_filter)]
    pub log_level: Option<LevelFilter>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect, (re)build if needed, and activate an environment
    ///
    /// Examples:
    ///   spycery activate --refresh smart
    ///   eval "$(spycery activate --shell)"
    Activate {
        #[command(flatten)]
        target: ActivationArgs,

        /// Report interpreter and installed package versions
        #[arg(long)]
        versions: bool,

        /// Print POSIX shell statements that apply the activation (takes precedence over --json)
        #[arg(long)]
        shell: bool,
    },

    /// Activate an environment, then run a command inside it
    ///
    /// Example: spycery run --refresh smart -- pytest -q
    Run {
        #[command(flatten)]
        target: ActivationArgs,

        /// Command and arguments
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// List installed packages of an existing environment (pip freeze)
    Freeze {
        /// Environment name (default: from env or "venv")
        #[arg(long, short, env = "SPYCERY_ENV_NAME")]
        name: Option<String>,

        /// Report the system interpreter instead of a virtual environment
        #[arg(long)]
        system: bool,
    },

    /// Manage environments under the root directory
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnvAction {
    /// Show environments with their build record
    List,

    /// Remove environments
    Clean {
        /// Dry run: show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,

        /// Force removal without confirmation
        #[arg(long, short)]
        force: bool,
    },
}

/// Which environment to activate and how.
#[derive(Args, Debug, Clone)]
pub struct ActivationArgs {
    /// Environment name (default: from env or "venv")
    #[arg(long, short, env = "SPYCERY_ENV_NAME")]
    pub name: Option<String>,

    /// Use the ambient system environment (no virtual environment)
    #[arg(long)]
    pub system: bool,

    /// Refresh policy: never, always or smart
    #[arg(long, default_value = "smart")]
    pub refresh: RefreshPolicy,

    /// Requirement file (repeatable). Default: discover requirements.txt
    #[arg(long = "requirements", short = 'r', value_name = "FILE")]
    pub requirements: Vec<PathBuf>,

    /// Interpreter used to create the environment (default: from env or python3)
    #[arg(long)]
    pub python: Option<String>,

    /// Provisioning timeout in seconds (default: from env or 600)
    #[arg(long)]
    pub provision_timeout: Option<u64>,

    /// Build lock timeout in seconds (default: from env or 300)
    #[arg(long)]
    pub lock_timeout: Option<u64>,

    /// When another process is building: block or fail-fast (default: from env or block)
    #[arg(long)]
    pub lock_mode: Option<LockMode>,
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    s.parse::<LevelFilter>()
        .map_err(|_| format!("invalid log level '{}'", s))
}
