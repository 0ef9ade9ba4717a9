use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::tempdir;

fn bin(cwd: &Path) -> Command {
    let path = assert_cmd::cargo::cargo_bin!("spycery");
    let mut cmd = Command::new(path);
    cmd.current_dir(cwd)
        .env_remove("SPYCERY_ENV_ROOT")
        .env_remove("WORKON_HOME")
        .env_remove("SPYCERY_ENV_NAME")
        .env_remove("SPYCERY_LOCK_MODE")
        .env_remove("SPYCERY_LOG_LEVEL")
        .env_remove("SPYCERY_LOG_JSON")
        .env_remove("SPYCERY_QUIET")
        .env_remove("RUST_LOG");
    cmd
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

/// Lay out something that looks like a built environment: an interpreter stub
/// and, optionally, an extra executable in its bin directory.
fn fake_env(root: &Path, name: &str, tool: Option<(&str, &str)>) {
    let bin_dir = root.join(name).join("bin");
    fs::create_dir_all(&bin_dir).unwrap();
    fs::write(bin_dir.join("python"), "").unwrap();
    if let Some((tool_name, script)) = tool {
        let path = bin_dir.join(tool_name);
        fs::write(&path, script).unwrap();
        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

#[test]
fn activate_system_mode_reports_active_without_location() {
    let dir = tempdir().unwrap();
    let output = bin(dir.path())
        .args(["--log-mode", "none", "--json", "activate", "--system"])
        .arg("--root")
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = parse_json(&output.stdout);
    assert_eq!(json["activation"]["state"], "active");
    assert_eq!(json["activation"]["descriptor"]["mode"], "system");
    assert!(json["activation"]["descriptor"]["location"].is_null());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn activate_never_fails_for_missing_environment() {
    let dir = tempdir().unwrap();
    bin(dir.path())
        .args(["--log-mode", "none", "activate", "--name", "missing", "--refresh", "never"])
        .arg("--root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("environment 'missing' not found"));
    assert!(!dir.path().join("missing").exists());
}

#[test]
fn activate_rejects_invalid_name() {
    let dir = tempdir().unwrap();
    bin(dir.path())
        .args(["--log-mode", "none", "activate", "--name", "../outside"])
        .arg("--root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("invalid environment descriptor"));
}

#[cfg(unix)]
#[test]
fn activate_reuses_existing_environment_under_never() {
    let dir = tempdir().unwrap();
    fake_env(dir.path(), "tooling", None);
    bin(dir.path())
        .args(["--log-mode", "none", "activate", "--name", "tooling", "--refresh", "never"])
        .arg("--root")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(contains("Environment 'tooling' active at"))
        .stdout(contains("(reused)"));
}

#[cfg(unix)]
#[test]
fn activate_shell_prints_exports() {
    let dir = tempdir().unwrap();
    fake_env(dir.path(), "tooling", None);
    let output = bin(dir.path())
        .args(["--log-mode", "none", "activate", "--shell", "--refresh", "never"])
        .args(["--name", "tooling"])
        .arg("--root")
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let bin_dir = dir.path().join("tooling").join("bin");
    assert!(stdout.starts_with(&format!("export PATH='{}:", bin_dir.display())));
    assert!(stdout.contains("unset PYTHONHOME"));
    assert!(stdout.contains("export VIRTUAL_ENV="));
}

#[cfg(unix)]
#[test]
fn run_executes_tool_from_environment() {
    let dir = tempdir().unwrap();
    fake_env(
        dir.path(),
        "tooling",
        Some(("whereami", "#!/bin/sh\necho \"venv=$VIRTUAL_ENV args=$*\"\n")),
    );
    let expected = format!("venv={} args=a b", dir.path().join("tooling").display());
    bin(dir.path())
        .args(["--log-mode", "none", "run", "--name", "tooling", "--refresh", "never"])
        .arg("--root")
        .arg(dir.path())
        .args(["--", "whereami", "a", "b"])
        .assert()
        .success()
        .stdout(contains(expected));
}

#[cfg(unix)]
#[test]
fn run_propagates_exit_code() {
    let dir = tempdir().unwrap();
    bin(dir.path())
        .args(["--log-mode", "none", "run", "--system", "--", "sh", "-c", "exit 3"])
        .assert()
        .code(3);
}

#[cfg(unix)]
#[test]
fn env_list_shows_only_environments() {
    let dir = tempdir().unwrap();
    fake_env(dir.path(), "tooling", None);
    fs::create_dir_all(dir.path().join("docs")).unwrap();

    let output = bin(dir.path())
        .args(["--log-mode", "none", "--json", "env", "list"])
        .arg("--root")
        .arg(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["tooling"]);
}

#[cfg(unix)]
#[test]
fn env_clean_dry_run_keeps_everything() {
    let dir = tempdir().unwrap();
    fake_env(dir.path(), "tooling", None);

    bin(dir.path())
        .args(["--log-mode", "none", "env", "clean", "--dry-run"])
        .arg("--root")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(contains("tooling"))
        .stderr(contains("Dry run"));
    assert!(dir.path().join("tooling").exists());
}

#[cfg(unix)]
#[test]
fn env_clean_force_removes_environments_only() {
    let dir = tempdir().unwrap();
    fake_env(dir.path(), "tooling", None);
    fake_env(dir.path(), "docs-env", None);
    fs::create_dir_all(dir.path().join("notes")).unwrap();

    bin(dir.path())
        .args(["--log-mode", "none", "env", "clean", "--force"])
        .arg("--root")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(contains("Removed 2 environment(s)"));
    assert!(!dir.path().join("tooling").exists());
    assert!(!dir.path().join("docs-env").exists());
    assert!(dir.path().join("notes").exists());
}

#[test]
fn file_log_mode_writes_transition_records() {
    let dir = tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    bin(dir.path())
        .env("SPYCERY_LOG_DIR", &log_dir)
        .args(["--log-mode", "file", "--log-name", "activation", "activate", "--system"])
        .assert()
        .success();

    let log = fs::read_to_string(log_dir.join("activation.log")).unwrap();
    assert!(log.contains("using system environment"), "{log}");
}
