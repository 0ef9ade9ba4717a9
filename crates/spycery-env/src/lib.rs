//! Environment activation: detect, (re)build and activate named virtual
//! environments, then expose them through an explicit [`ResolutionContext`].

pub mod activator;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod log;
pub mod process;
pub mod provisioner;
pub mod record;
pub mod requirements;

pub use activator::{Activation, Activator, ActivatorConfig};
pub use context::{ContextJournal, ResolutionContext};
pub use descriptor::{
    ActivationRequest, ActivationState, EnvMode, EnvironmentDescriptor, RefreshPolicy,
};
pub use error::ActivationError;
pub use fingerprint::Fingerprint;
pub use provisioner::{ProvisionError, ProvisionPlan, Provisioner, VenvProvisioner};
