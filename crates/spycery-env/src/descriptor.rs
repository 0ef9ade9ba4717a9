//! Descriptor, policy and state types for one activation request.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

use crate::error::ActivationError;

/// Whether activation needs an isolated environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// An isolated environment must exist (or be built) and take precedence.
    #[default]
    Virtual,
    /// Use the ambient environment unmodified.
    System,
}

impl FromStr for EnvMode {
    type Err = ActivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "virtual" | "venv" => Ok(Self::Virtual),
            "system" | "native" => Ok(Self::System),
            other => Err(ActivationError::InvalidDescriptor {
                name: String::new(),
                reason: format!("unsupported environment mode '{}'", other),
            }),
        }
    }
}

/// When an existing environment gets rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Reuse whatever exists; never create.
    #[default]
    Never,
    /// Destroy and rebuild on every activation.
    Always,
    /// Rebuild when the requirements fingerprint no longer matches the build record.
    Smart,
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "never" | "none" => Ok(Self::Never),
            "always" | "force" => Ok(Self::Always),
            "smart" => Ok(Self::Smart),
            other => Err(format!(
                "unknown refresh policy '{}' (expected never, always or smart)",
                other
            )),
        }
    }
}

/// Per-call activation state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Unresolved,
    Building,
    Active,
    Failed,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unresolved => "unresolved",
            Self::Building => "building",
            Self::Active => "active",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Identifies one environment. `location` is only populated on the copy
/// returned inside a successful [`crate::Activation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub mode: EnvMode,
    /// Explicit requirement files. `None` means discover `requirements.txt`
    /// from the project directory upwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_files: Option<Vec<PathBuf>>,
    location: Option<PathBuf>,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>, mode: EnvMode) -> Self {
        Self {
            name: name.into(),
            mode,
            requirement_files: None,
            location: None,
        }
    }

    pub fn virtual_env(name: impl Into<String>) -> Self {
        Self::new(name, EnvMode::Virtual)
    }

    pub fn system() -> Self {
        Self::new("system", EnvMode::System)
    }

    pub fn with_requirement_files(mut self, files: Vec<PathBuf>) -> Self {
        self.requirement_files = Some(files);
        self
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub(crate) fn resolved(&self, location: Option<PathBuf>) -> Self {
        Self {
            location,
            ..self.clone()
        }
    }
}

/// Arguments of a single `activate` call.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub descriptor: EnvironmentDescriptor,
    pub policy: RefreshPolicy,
    /// Verbosity of this call's transition records.
    pub log_level: LevelFilter,
}

impl ActivationRequest {
    pub fn new(descriptor: EnvironmentDescriptor, policy: RefreshPolicy) -> Self {
        Self {
            descriptor,
            policy,
            log_level: LevelFilter::INFO,
        }
    }

    pub fn with_log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes_and_policies() {
        assert_eq!("native".parse::<EnvMode>().unwrap(), EnvMode::System);
        assert_eq!("VIRTUAL".parse::<EnvMode>().unwrap(), EnvMode::Virtual);
        assert!(matches!(
            "docker".parse::<EnvMode>(),
            Err(ActivationError::InvalidDescriptor { .. })
        ));
        assert_eq!("force".parse::<RefreshPolicy>().unwrap(), RefreshPolicy::Always);
        assert_eq!("smart".parse::<RefreshPolicy>().unwrap(), RefreshPolicy::Smart);
        assert!("sometimes".parse::<RefreshPolicy>().is_err());
    }

    #[test]
    fn test_descriptor_location_absent_until_resolved() {
        let d = EnvironmentDescriptor::virtual_env("tooling");
        assert!(d.location().is_none());
        let r = d.resolved(Some(PathBuf::from("/envs/tooling")));
        assert_eq!(r.location(), Some(Path::new("/envs/tooling")));
        assert_eq!(r.name, "tooling");
    }
}
