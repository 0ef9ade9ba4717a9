//! Build record: the fingerprint captured after the last successful build.
//!
//! Stored as `<location>/.spycery_build.json`. It is written only after
//! provisioning succeeds and removed before a rebuild starts, so its presence
//! doubles as the "environment complete" marker.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;

pub const RECORD_FILE: &str = ".spycery_build.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub name: String,
    pub fingerprint: Fingerprint,
    pub interpreter: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub built_at: DateTime<Utc>,
    #[serde(default)]
    pub tool_version: String,
}

impl BuildRecord {
    pub fn new(
        name: &str,
        fingerprint: Fingerprint,
        interpreter: &str,
        requirements: &[String],
    ) -> Self {
        Self {
            name: name.to_string(),
            fingerprint,
            interpreter: interpreter.to_string(),
            requirements: requirements.to_vec(),
            built_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn record_path(location: &Path) -> PathBuf {
    location.join(RECORD_FILE)
}

/// Read the record. A missing or unparsable record, or one whose fingerprint
/// is not a SHA-256 hex digest, counts as "no record".
pub fn load(location: &Path) -> Option<BuildRecord> {
    let path = record_path(location);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<BuildRecord>(&content) {
        Ok(record) if record.fingerprint.is_well_formed() => Some(record),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "ignoring build record with malformed fingerprint");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable build record");
            None
        }
    }
}

/// Write the record via a temp file + rename so readers never see a partial file.
pub fn store(location: &Path, record: &BuildRecord) -> Result<()> {
    let path = record_path(location);
    let tmp = location.join(format!("{}.tmp", RECORD_FILE));
    let content = serde_json::to_string_pretty(record).context("Serialize build record")?;
    fs::write(&tmp, content)
        .with_context(|| format!("Failed to write build record: {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("Failed to move build record into place: {}", path.display()))?;
    Ok(())
}

/// Remove the record if present.
pub fn remove(location: &Path) -> Result<()> {
    let path = record_path(location);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove build record: {}", path.display())),
    }
}
