//! Environment management commands: list and clean environments under the root.
//!
//! Environments live in `<root>/<name>/` (root from `--root`, `$SPYCERY_ENV_ROOT`
//! or the current directory). Only directories holding an interpreter or a build
//! record count as environments; `<name>.lock` siblings are never touched.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spycery_core::config::EnvConfig;
use spycery_env::lock::{lock_path_for, BuildLock};
use spycery_env::record::{self, BuildRecord};
use spycery_env::{Provisioner, VenvProvisioner};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct EnvEntry {
    name: String,
    location: PathBuf,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    built_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    requirements: Vec<String>,
}

impl EnvEntry {
    fn new(location: PathBuf, record: Option<BuildRecord>) -> Self {
        let name = location
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let size_bytes = dir_size(&location);
        let (fingerprint, built_at, requirements) = match record {
            Some(r) => (
                Some(r.fingerprint.as_str().to_string()),
                Some(r.built_at),
                r.requirements,
            ),
            None => (None, None, Vec::new()),
        };
        Self {
            name,
            location,
            size_bytes,
            fingerprint,
            built_at,
            requirements,
        }
    }
}

fn env_root(root: Option<PathBuf>) -> PathBuf {
    EnvConfig::from_env()
        .with_cli_overrides(root, None, None, None)
        .root
}

/// Environments directly under `root`, sorted by name.
fn scan(root: &Path) -> Result<Vec<EnvEntry>> {
    let provisioner = VenvProvisioner::new();
    let mut entries = Vec::new();
    let dir_entries =
        fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))?;
    for entry in dir_entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let record = record::load(&path);
        if record.is_none() && !provisioner.exists(&path) {
            continue;
        }
        entries.push(EnvEntry::new(path, record));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// `spycery env list`
pub fn cmd_list(root: Option<PathBuf>, json: bool) -> Result<()> {
    let root = env_root(root);
    let entries = if root.exists() { scan(&root)? } else { Vec::new() };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No environments found at {}", root.display());
        return Ok(());
    }

    println!("Environments ({}) in {}:", entries.len(), root.display());
    for e in &entries {
        let built = match (&e.fingerprint, &e.built_at) {
            (Some(fp), Some(at)) => format!(
                "{}, built {}",
                fp.get(..12).unwrap_or(fp.as_str()),
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            _ => "no build record".to_string(),
        };
        println!("  • {} ({}, {})", e.name, format_size(e.size_bytes), built);
    }
    Ok(())
}

/// `spycery env clean`
pub fn cmd_clean(root: Option<PathBuf>, dry_run: bool, force: bool) -> Result<()> {
    let root = env_root(root);

    if !root.exists() {
        eprintln!("No environments found at {}", root.display());
        return Ok(());
    }

    let entries = scan(&root)?;
    if entries.is_empty() {
        eprintln!("No environments found at {}", root.display());
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();
    eprintln!("🗂  Environments ({}) in {}:", entries.len(), root.display());
    eprintln!();
    for e in &entries {
        eprintln!("  • {} ({})", e.name, format_size(e.size_bytes));
    }
    eprintln!();
    eprintln!("Total: {} ({} environments)", format_size(total_size), entries.len());

    if dry_run {
        eprintln!();
        eprintln!("(Dry run: no files removed. Remove --dry-run to delete.)");
        return Ok(());
    }

    if !force {
        eprint!("\nRemove all environments? [y/N] ");
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let mut removed = 0;
    let mut freed: u64 = 0;
    let mut skipped = 0;
    let mut errors = 0;
    for e in &entries {
        // A held lock means a build is in progress.
        let _lock = match BuildLock::try_acquire(&lock_path_for(&e.location)) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                eprintln!("  - Skipping {}: being built by another process", e.name);
                skipped += 1;
                continue;
            }
            Err(err) => {
                eprintln!("  ✗ Failed to lock {}: {}", e.name, err);
                errors += 1;
                continue;
            }
        };
        match fs::remove_dir_all(&e.location) {
            Ok(()) => {
                removed += 1;
                freed += e.size_bytes;
            }
            Err(err) => {
                eprintln!("  ✗ Failed to remove {}: {}", e.name, err);
                errors += 1;
            }
        }
    }

    eprintln!();
    if errors == 0 && skipped == 0 {
        eprintln!(
            "✓ Removed {} environment(s), freed {}",
            removed,
            format_size(freed)
        );
    } else {
        eprintln!(
            "⚠ Removed {}/{} environments ({} skipped, {} errors)",
            removed,
            entries.len(),
            skipped,
            errors
        );
    }
    Ok(())
}

/// Compute total size of a directory recursively (symlinks are not followed).
fn dir_size(path: &Path) -> u64 {
    let mut total: u64 = 0;
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            let Ok(meta) = fs::symlink_metadata(entry.path()) else {
                continue;
            };
            if meta.is_dir() {
                total += dir_size(&entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}

/// Format byte size to human-readable string.
fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spycery_env::provisioner::venv::python_executable;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_scan_only_reports_environments() {
        let tmp = tempfile::tempdir().unwrap();
        let env = tmp.path().join("tooling");
        let python = python_executable(&env);
        fs::create_dir_all(python.parent().unwrap()).unwrap();
        fs::write(&python, "1234").unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("tooling.lock"), "").unwrap();

        let entries = scan(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "tooling");
        assert_eq!(entries[0].size_bytes, 4);
        assert!(entries[0].fingerprint.is_none());
    }
}
