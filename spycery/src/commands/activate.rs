//! `spycery activate` and `spycery freeze`.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use spycery_core::config::EnvConfig;
use spycery_env::process::run_bounded;
use spycery_env::provisioner::venv::python_executable;
use spycery_env::{
    Activation, ActivationRequest, Activator, ActivatorConfig, EnvironmentDescriptor,
    RefreshPolicy, ResolutionContext, VenvProvisioner,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use crate::cli::ActivationArgs;

/// Interpreter and package versions of an environment.
#[derive(Debug, Serialize)]
pub struct VersionReport {
    pub python: String,
    pub packages: BTreeMap<String, String>,
}

impl VersionReport {
    fn log(&self) {
        tracing::debug!("    {:24} {}", "python", self.python);
        for (name, version) in &self.packages {
            tracing::debug!("    {:24} {}", name, version);
        }
    }

    fn print_table(&self) {
        println!("    {:24} {}", "python", self.python);
        for (name, version) in &self.packages {
            println!("    {:24} {}", name, version);
        }
    }
}

/// `spycery activate`
pub fn cmd_activate(
    root: Option<PathBuf>,
    target: &ActivationArgs,
    log_level: LevelFilter,
    versions: bool,
    shell: bool,
    json: bool,
) -> Result<()> {
    let (activator, request) = super::prepare(root, target, log_level)?;
    let mut ctx = ResolutionContext::from_process();
    let activation = activator.activate(&mut ctx, &request)?;

    let report = if versions {
        let report = version_report(activation.location(), activator.config().provision_timeout)?;
        report.log();
        Some(report)
    } else {
        None
    };

    if shell {
        print!("{}", shell_exports(&ctx)?);
        return Ok(());
    }

    if json {
        let out = json!({
            "activation": activation,
            "versions": report,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_summary(&activation);
    if let Some(report) = report {
        println!();
        report.print_table();
    }
    Ok(())
}

/// `spycery freeze`
pub fn cmd_freeze(
    root: Option<PathBuf>,
    name: Option<String>,
    system: bool,
    log_level: LevelFilter,
    json: bool,
) -> Result<()> {
    let cfg = EnvConfig::from_env().with_cli_overrides(root, None, None, None);
    let project_dir = std::env::current_dir().context("Failed to read current directory")?;
    let timeout = cfg.provision_timeout;
    let descriptor = if system {
        EnvironmentDescriptor::system()
    } else {
        EnvironmentDescriptor::virtual_env(name.unwrap_or_else(|| cfg.default_name.clone()))
    };
    let activator = Activator::new(
        ActivatorConfig::from_env_config(&cfg, project_dir),
        VenvProvisioner::new(),
    );
    let request =
        ActivationRequest::new(descriptor, RefreshPolicy::Never).with_log_level(log_level);
    let mut ctx = ResolutionContext::from_process();
    let activation = activator.activate(&mut ctx, &request)?;

    let report = version_report(activation.location(), timeout)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (name, version) in &report.packages {
            if version.is_empty() {
                println!("{}", name);
            } else {
                println!("{}=={}", name, version);
            }
        }
    }
    Ok(())
}

fn print_summary(activation: &Activation) {
    let name = &activation.descriptor.name;
    match activation.location() {
        None => println!("✓ Using system environment"),
        Some(location) => {
            let how = if activation.rebuilt { "built" } else { "reused" };
            println!(
                "✓ Environment '{}' active at {} ({})",
                name,
                location.display(),
                how
            );
        }
    }
    if let Some(ref fingerprint) = activation.fingerprint {
        println!("  fingerprint: {}", fingerprint.short());
    }
}

/// Python version plus `pip freeze` for `location` (system python when `None`).
pub fn version_report(location: Option<&Path>, timeout: Duration) -> Result<VersionReport> {
    let location = location.unwrap_or_else(|| Path::new(""));
    let python = python_executable(location);
    let mut cmd = Command::new(&python);
    cmd.arg("--version");
    let out = run_bounded(&mut cmd, timeout)
        .with_context(|| format!("Failed to run {}", python.display()))?;
    if !out.success() {
        anyhow::bail!("{} --version failed: {}", python.display(), out.stderr.trim());
    }
    let packages = VenvProvisioner::new().installed_packages(location, timeout)?;
    Ok(VersionReport {
        python: parse_python_version(&out.stdout, &out.stderr),
        packages,
    })
}

/// `Python 3.12.1` on stdout (stderr for old interpreters) → `3.12.1`.
fn parse_python_version(stdout: &str, stderr: &str) -> String {
    let text = if stdout.trim().is_empty() { stderr } else { stdout };
    let text = text.trim();
    text.strip_prefix("Python ").unwrap_or(text).to_string()
}

/// POSIX shell statements reproducing `ctx` in a parent shell.
pub fn shell_exports(ctx: &ResolutionContext) -> Result<String> {
    let path = ctx
        .path_var()
        .context("Search path contains an entry that cannot be joined")?;
    let mut out = format!("export PATH={}\n", shell_quote(&path.to_string_lossy()));
    for (key, value) in ctx.vars() {
        match value {
            Some(v) => out.push_str(&format!("export {}={}\n", key, shell_quote(v))),
            None => out.push_str(&format!("unset {}\n", key)),
        }
    }
    Ok(out)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
