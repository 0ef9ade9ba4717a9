//! Python virtual environment provisioner: `python -m venv` + `pip install`.

use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use super::{ProvisionError, ProvisionPlan, Provisioner};
use crate::process::{run_bounded, BoundedOutput};

/// Builds environments with the standard library `venv` module.
#[derive(Debug, Clone, Default)]
pub struct VenvProvisioner {
    /// Interpreter used to create environments; `None` means the plan's interpreter.
    python: Option<PathBuf>,
}

impl VenvProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_python(python: impl Into<PathBuf>) -> Self {
        Self {
            python: Some(python.into()),
        }
    }

    /// `pip freeze` of the environment as name → version (empty version for
    /// non-pinned entries such as editable installs).
    pub fn installed_packages(
        &self,
        location: &Path,
        timeout: Duration,
    ) -> anyhow::Result<BTreeMap<String, String>> {
        let mut cmd = Command::new(python_executable(location));
        cmd.args(["-m", "pip", "freeze", "--disable-pip-version-check"]);
        let out = run_bounded(&mut cmd, timeout)?;
        if !out.success() {
            anyhow::bail!("pip freeze failed: {}", out.stderr.trim());
        }
        Ok(parse_freeze(&out.stdout))
    }

    fn base_interpreter(&self, plan: &ProvisionPlan) -> Result<PathBuf, ProvisionError> {
        if let Some(ref python) = self.python {
            return Ok(python.clone());
        }
        which::which(&plan.interpreter)
            .or_else(|_| which_python())
            .map_err(ProvisionError::Other)
    }

    fn create_venv(
        &self,
        location: &Path,
        plan: &ProvisionPlan,
        budget: &Budget,
    ) -> Result<(), ProvisionError> {
        let python = self.base_interpreter(plan)?;
        if let Some(parent) = location.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tracing::debug!(location = %location.display(), python = %python.display(), "creating virtual environment");
        let mut cmd = Command::new(&python);
        cmd.arg("-m").arg("venv").arg("--clear").arg(location);
        let out = run_bounded(&mut cmd, budget.remaining("venv")?)?;
        check_step("venv", out, budget)
    }

    fn install_requirements(
        &self,
        location: &Path,
        requirements: &[String],
        budget: &Budget,
    ) -> Result<(), ProvisionError> {
        if requirements.is_empty() {
            return Ok(());
        }
        let python = python_executable(location);

        tracing::debug!("upgrading pip");
        let mut cmd = Command::new(&python);
        cmd.args(pip_install_args(&["--upgrade".to_string(), "pip".to_string()]));
        let out = run_bounded(&mut cmd, budget.remaining("pip upgrade")?)?;
        check_step("pip upgrade", out, budget)?;

        tracing::debug!(count = requirements.len(), "installing requirements");
        let mut cmd = Command::new(&python);
        cmd.args(pip_install_args(requirements));
        let out = run_bounded(&mut cmd, budget.remaining("pip install")?)?;
        check_step("pip install", out, budget)
    }
}

/// `-m pip install` with non-interactive flags, followed by `packages`.
fn pip_install_args(packages: &[String]) -> Vec<String> {
    let mut args: Vec<String> = [
        "-m",
        "pip",
        "install",
        "--quiet",
        "--disable-pip-version-check",
        "--no-input",
    ]
    .iter()
    .map(|a| a.to_string())
    .collect();
    args.extend(packages.iter().cloned());
    args
}

impl Provisioner for VenvProvisioner {
    fn exists(&self, location: &Path) -> bool {
        python_executable(location).exists()
    }

    fn ensure(
        &self,
        location: &Path,
        plan: &ProvisionPlan,
        timeout: Duration,
    ) -> Result<(), ProvisionError> {
        let budget = Budget::start(timeout);
        let mut created = false;

        if !self.exists(location) {
            // Remove incomplete environment if exists
            if location.exists() {
                fs::remove_dir_all(location).with_context(|| {
                    format!("Failed to remove incomplete environment: {}", location.display())
                })?;
            }
            self.create_venv(location, plan, &budget)
                .inspect_err(|_| discard(location))?;
            created = true;
        }

        self.install_requirements(location, &plan.requirements, &budget)
            .inspect_err(|_| {
                if created {
                    discard(location);
                }
            })
    }

    fn destroy(&self, location: &Path) -> Result<(), ProvisionError> {
        if !location.exists() {
            return Ok(());
        }
        fs::remove_dir_all(location)
            .with_context(|| format!("Failed to remove environment: {}", location.display()))?;
        Ok(())
    }
}

/// Directory holding the environment's executables.
pub fn bin_dir(location: &Path) -> PathBuf {
    if cfg!(target_os = "windows") {
        location.join("Scripts")
    } else {
        location.join("bin")
    }
}

/// Path to python inside the environment (system `python3` when there is none).
pub fn python_executable(location: &Path) -> PathBuf {
    if location.as_os_str().is_empty() {
        PathBuf::from("python3")
    } else if cfg!(target_os = "windows") {
        bin_dir(location).join("python.exe")
    } else {
        bin_dir(location).join("python")
    }
}

/// First of `python3`, `python` found on PATH.
pub fn which_python() -> anyhow::Result<PathBuf> {
    for name in ["python3", "python"] {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }
    anyhow::bail!("python3 or python not found in PATH")
}

fn parse_freeze(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| match line.split_once("==") {
            Some((name, version)) => (name.trim().to_string(), version.trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

fn discard(location: &Path) {
    if let Err(e) = fs::remove_dir_all(location) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(location = %location.display(), error = %e, "failed to remove partial environment");
        }
    }
}

fn check_step(step: &str, out: BoundedOutput, budget: &Budget) -> Result<(), ProvisionError> {
    if out.timed_out {
        return Err(ProvisionError::TimedOut {
            step: step.to_string(),
            timeout: budget.total,
        });
    }
    if !out.success() {
        let detail = match out.exit_code {
            Some(code) => format!("exit code {}: {}", code, out.stderr.trim()),
            None => format!("terminated by signal: {}", out.stderr.trim()),
        };
        return Err(ProvisionError::StepFailed {
            step: step.to_string(),
            detail,
        });
    }
    Ok(())
}

/// Time budget shared by all steps of one `ensure` call.
struct Budget {
    start: Instant,
    total: Duration,
}

impl Budget {
    fn start(total: Duration) -> Self {
        Self {
            start: Instant::now(),
            total,
        }
    }

    fn remaining(&self, step: &str) -> Result<Duration, ProvisionError> {
        let left = self.total.saturating_sub(self.start.elapsed());
        if left.is_zero() {
            return Err(ProvisionError::TimedOut {
                step: step.to_string(),
                timeout: self.total,
            });
        }
        Ok(left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_executable_layout() {
        assert_eq!(python_executable(Path::new("")), PathBuf::from("python3"));
        let loc = Path::new("/envs/tooling");
        if cfg!(target_os = "windows") {
            assert_eq!(python_executable(loc), loc.join("Scripts").join("python.exe"));
        } else {
            assert_eq!(python_executable(loc), loc.join("bin").join("python"));
        }
    }

    #[test]
    fn test_parse_freeze() {
        let parsed = parse_freeze("numpy==1.26.4\n-e git+https://x/y#egg=y\n\nrequests == 2.31.0\n");
        assert_eq!(parsed.get("numpy").map(String::as_str), Some("1.26.4"));
        assert_eq!(parsed.get("requests").map(String::as_str), Some("2.31.0"));
        assert_eq!(
            parsed.get("-e git+https://x/y#egg=y").map(String::as_str),
            Some("")
        );
    }

    #[test]
    fn test_exists_and_destroy() {
        let tmp = tempfile::tempdir().unwrap();
        let location = tmp.path().join("venv");
        let provisioner = VenvProvisioner::new();
        assert!(!provisioner.exists(&location));
        provisioner.destroy(&location).unwrap();

        let python = python_executable(&location);
        fs::create_dir_all(python.parent().unwrap()).unwrap();
        fs::write(&python, "").unwrap();
        assert!(provisioner.exists(&location));

        provisioner.destroy(&location).unwrap();
        assert!(!location.exists());
    }

    #[test]
    fn test_zero_budget_times_out_before_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let location = tmp.path().join("venv");
        let provisioner = VenvProvisioner::with_python("/nonexistent/python");
        let plan = ProvisionPlan {
            fingerprint: crate::fingerprint::Fingerprint::compute(
                "python3",
                &crate::requirements::Requirements::default(),
            ),
            interpreter: "python3".to_string(),
            requirements: Vec::new(),
        };
        let err = provisioner
            .ensure(&location, &plan, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ProvisionError::TimedOut { .. }));
        assert!(!location.exists());
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let location = tmp.path().join("venv");
        let provisioner = VenvProvisioner::with_python("/nonexistent/python");
        let plan = ProvisionPlan {
            fingerprint: crate::fingerprint::Fingerprint::compute(
                "python3",
                &crate::requirements::Requirements::default(),
            ),
            interpreter: "python3".to_string(),
            requirements: vec!["numpy".to_string()],
        };
        let err = provisioner
            .ensure(&location, &plan, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Other(_)));
        assert!(!location.exists());
    }

    #[test]
    fn test_pip_install_args() {
        let args = pip_install_args(&["numpy==1.26.4".to_string()]);
        assert_eq!(&args[..3], ["-m", "pip", "install"]);
        assert!(args.contains(&"--no-input".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("numpy==1.26.4"));
    }

    #[cfg(unix)]
    #[test]
    fn test_pip_is_upgraded_before_requirements() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let location = tmp.path().join("venv");
        let log = tmp.path().join("calls.log");
        let python = python_executable(&location);
        fs::create_dir_all(python.parent().unwrap()).unwrap();
        fs::write(
            &python,
            format!("#!/bin/sh\necho \"$*\" >> '{}'\n", log.display()),
        )
        .unwrap();
        fs::set_permissions(&python, fs::Permissions::from_mode(0o755)).unwrap();

        let plan = ProvisionPlan {
            fingerprint: crate::fingerprint::Fingerprint::compute(
                "python3",
                &crate::requirements::Requirements::default(),
            ),
            interpreter: "python3".to_string(),
            requirements: vec!["numpy".to_string()],
        };
        VenvProvisioner::new()
            .ensure(&location, &plan, Duration::from_secs(10))
            .unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("--upgrade pip"), "{}", calls[0]);
        assert!(calls[1].ends_with("numpy"), "{}", calls[1]);
    }
}
