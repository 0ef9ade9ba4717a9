//! Provisioning collaborator: the only place environments are created,
//! populated or destroyed.
//!
//! The activator decides *whether* to build; a [`Provisioner`] decides *how*.
//! [`venv::VenvProvisioner`] is the default implementation.

pub mod venv;

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::fingerprint::Fingerprint;

pub use venv::VenvProvisioner;

/// What to build at a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub fingerprint: Fingerprint,
    /// Interpreter declaration, e.g. `python3` or an absolute path.
    pub interpreter: String,
    pub requirements: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{step} failed: {detail}")]
    StepFailed { step: String, detail: String },

    #[error("{step} exceeded the provisioning timeout of {}s", timeout.as_secs())]
    TimedOut { step: String, timeout: Duration },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Narrow contract between the activator and whatever builds environments.
///
/// Implementations must leave no half-built environment behind on failure
/// where they can avoid it.
pub trait Provisioner: Send + Sync {
    /// Whether a usable environment exists at `location`.
    fn exists(&self, location: &Path) -> bool;

    /// Create or refresh the environment so it satisfies `plan`, within `timeout`.
    fn ensure(&self, location: &Path, plan: &ProvisionPlan, timeout: Duration)
        -> Result<(), ProvisionError>;

    /// Remove the environment. Removing a missing environment succeeds.
    fn destroy(&self, location: &Path) -> Result<(), ProvisionError>;
}
