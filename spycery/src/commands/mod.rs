//! CLI commands.
//!
//!   activate — detect / (re)build / activate, optional version report
//!   run      — acquire-before-run: activate, then spawn a tool in the context
//!   env      — list and clean environments under the root

pub mod activate;
pub mod env;
pub mod run;

use anyhow::{Context, Result};
use spycery_core::config::EnvConfig;
use spycery_env::{
    ActivationRequest, Activator, ActivatorConfig, EnvironmentDescriptor, VenvProvisioner,
};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

use crate::cli::ActivationArgs;

/// Resolved configuration (env, then CLI flags).
pub fn env_config(root: Option<PathBuf>, target: &ActivationArgs) -> EnvConfig {
    let mut cfg = EnvConfig::from_env().with_cli_overrides(
        root,
        target.provision_timeout,
        target.lock_timeout,
        target.lock_mode,
    );
    if let Some(ref python) = target.python {
        cfg.python = Some(python.clone());
    }
    cfg
}

/// Build the activator and request for one CLI invocation.
pub fn prepare(
    root: Option<PathBuf>,
    target: &ActivationArgs,
    log_level: LevelFilter,
) -> Result<(Activator<VenvProvisioner>, ActivationRequest)> {
    let cfg = env_config(root, target);
    let project_dir = std::env::current_dir().context("Failed to read current directory")?;
    let activator = Activator::new(
        ActivatorConfig::from_env_config(&cfg, project_dir),
        VenvProvisioner::new(),
    );

    let descriptor = if target.system {
        EnvironmentDescriptor::system()
    } else {
        let name = target.name.clone().unwrap_or(cfg.default_name);
        let descriptor = EnvironmentDescriptor::virtual_env(name);
        if target.requirements.is_empty() {
            descriptor
        } else {
            descriptor.with_requirement_files(target.requirements.clone())
        }
    };
    let request = ActivationRequest::new(descriptor, target.refresh).with_log_level(log_level);
    Ok((activator, request))
}
