mod cli;
mod commands;
mod observability;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, EnvAction};
use spycery_core::config::ObservabilityConfig;
use tracing::level_filters::LevelFilter;

use observability::LogMode;

fn main() -> Result<()> {
    spycery_core::config::load_dotenv();
    let cli = Cli::parse();

    let log_mode = cli
        .log_mode
        .unwrap_or_else(|| LogMode::from_config(ObservabilityConfig::from_env()));
    if let Some(path) = observability::init_tracing(log_mode, &cli.log_name, cli.log_level)? {
        tracing::debug!(file = %path.display(), "logging to file");
    }
    let log_level = match log_mode {
        LogMode::None => LevelFilter::OFF,
        _ => cli.log_level.unwrap_or(LevelFilter::INFO),
    };

    match cli.command {
        Commands::Activate {
            target,
            versions,
            shell,
        } => {
            commands::activate::cmd_activate(
                cli.root, &target, log_level, versions, shell, cli.json,
            )?;
        }
        Commands::Run { target, command } => {
            let code = commands::run::cmd_run(cli.root, &target, log_level, &command)?;
            std::process::exit(code);
        }
        Commands::Freeze { name, system } => {
            commands::activate::cmd_freeze(cli.root, name, system, log_level, cli.json)?;
        }
        Commands::Env { action } => match action {
            EnvAction::List => commands::env::cmd_list(cli.root, cli.json)?,
            EnvAction::Clean { dry_run, force } => {
                commands::env::cmd_clean(cli.root, dry_run, force)?
            }
        },
    }
    Ok(())
}
