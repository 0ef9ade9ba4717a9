use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Typed outcome of a failed activation. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("invalid environment descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("environment '{name}' not found at {} and refresh policy is 'never'", location.display())]
    EnvironmentNotFound { name: String, location: PathBuf },

    #[error("provisioning environment '{name}' failed: {reason}")]
    ProvisioningFailed { name: String, reason: String },

    #[error("environment '{name}' is being built by another process (lock {} not acquired after {}s)", lock_path.display(), waited.as_secs())]
    LockTimeout {
        name: String,
        lock_path: PathBuf,
        waited: Duration,
    },
}

impl ActivationError {
    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProvisioningFailed { .. } | Self::LockTimeout { .. }
        )
    }

    /// Short stable label, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDescriptor { .. } => "invalid_descriptor",
            Self::EnvironmentNotFound { .. } => "environment_not_found",
            Self::ProvisioningFailed { .. } => "provisioning_failed",
            Self::LockTimeout { .. } => "lock_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let invalid = ActivationError::InvalidDescriptor {
            name: "".into(),
            reason: "name is empty".into(),
        };
        let missing = ActivationError::EnvironmentNotFound {
            name: "venv".into(),
            location: PathBuf::from("/envs/venv"),
        };
        let failed = ActivationError::ProvisioningFailed {
            name: "venv".into(),
            reason: "pip install failed".into(),
        };
        let locked = ActivationError::LockTimeout {
            name: "venv".into(),
            lock_path: PathBuf::from("/envs/venv.lock"),
            waited: Duration::from_secs(3),
        };
        assert!(!invalid.is_retryable());
        assert!(!missing.is_retryable());
        assert!(failed.is_retryable());
        assert!(locked.is_retryable());
        assert_eq!(locked.kind(), "lock_timeout");
        assert!(missing.to_string().contains("/envs/venv"));
    }
}
