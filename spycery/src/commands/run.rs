//! `spycery run -- <command>`: activate, then run the command inside the
//! activated context. The exit code of the command becomes ours.

use anyhow::{Context, Result};
use spycery_env::ResolutionContext;
use std::path::PathBuf;
use std::process::Command;
use tracing::level_filters::LevelFilter;

use crate::cli::ActivationArgs;

pub fn cmd_run(
    root: Option<PathBuf>,
    target: &ActivationArgs,
    log_level: LevelFilter,
    command: &[String],
) -> Result<i32> {
    let (program, args) = command.split_first().context("No command given")?;
    let (activator, request) = super::prepare(root, target, log_level)?;
    let mut ctx = ResolutionContext::from_process();
    let activation = activator.activate(&mut ctx, &request)?;

    let resolved = ctx.resolve(program).unwrap_or_else(|| PathBuf::from(program));
    tracing::debug!(
        env = %activation.descriptor.name,
        program = %resolved.display(),
        "running command"
    );

    let mut cmd = Command::new(&resolved);
    cmd.args(args);
    ctx.apply_to_command(&mut cmd)
        .context("Search path contains an entry that cannot be joined")?;
    let status = cmd
        .status()
        .with_context(|| format!("Failed to start '{}'", program))?;
    Ok(exit_code(status))
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
