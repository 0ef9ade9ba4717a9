//! Environment activator: runs the activation state machine to completion.
//!
//! ```text
//! UNRESOLVED --detect--> exists?
//!     yes, policy reuses          --> ACTIVE
//!     yes, policy rebuilds        --> BUILDING
//!     no,  policy is NEVER        --> FAILED (EnvironmentNotFound)
//!     no,  policy may create      --> BUILDING
//! BUILDING --provision ok-->   ACTIVE
//! BUILDING --provision fails--> FAILED (ProvisioningFailed / LockTimeout)
//! ```
//!
//! The resolution context is only touched on the way into ACTIVE, so a failed
//! call never leaves a partial activation behind.

use serde::Serialize;
use spycery_core::config::env_keys::activation::{PYTHONHOME, VIRTUAL_ENV};
use spycery_core::config::{EnvConfig, LockMode};
use spycery_core::path_validation::{join_under_root, validate_name_token};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::Level;

use crate::context::{ContextJournal, ResolutionContext};
use crate::descriptor::{
    ActivationRequest, ActivationState, EnvMode, EnvironmentDescriptor, RefreshPolicy,
};
use crate::error::ActivationError;
use crate::fingerprint::Fingerprint;
use crate::lock::{lock_path_for, BuildLock, LockError};
use crate::log;
use crate::provisioner::venv::bin_dir;
use crate::provisioner::{ProvisionPlan, Provisioner};
use crate::record::{self, BuildRecord};
use crate::requirements::{self, Requirements};


/// Settings shared by every activation of one activator.
#[derive(Debug, Clone)]
pub struct ActivatorConfig {
    /// Directory holding environments; a descriptor named `n` lives at `<root>/n`.
    pub root: PathBuf,
    /// Start of the `requirements.txt` search.
    pub project_dir: PathBuf,
    /// Also look for `requirements.txt` in the current working directory.
    pub include_cwd: bool,
    /// Interpreter declaration; part of the fingerprint.
    pub interpreter: String,
    pub provision_timeout: Duration,
    pub lock_timeout: Duration,
    pub lock_mode: LockMode,
}

impl ActivatorConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            project_dir: root.clone(),
            root,
            include_cwd: true,
            interpreter: "python3".to_string(),
            provision_timeout: Duration::from_secs(
                spycery_core::config::schema::DEFAULT_PROVISION_TIMEOUT_SECS,
            ),
            lock_timeout: Duration::from_secs(
                spycery_core::config::schema::DEFAULT_LOCK_TIMEOUT_SECS,
            ),
            lock_mode: LockMode::Block,
        }
    }

    pub fn from_env_config(cfg: &EnvConfig, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: cfg.root.clone(),
            project_dir: project_dir.into(),
            include_cwd: true,
            interpreter: cfg.python.clone().unwrap_or_else(|| "python3".to_string()),
            provision_timeout: cfg.provision_timeout,
            lock_timeout: cfg.lock_timeout,
            lock_mode: cfg.lock_mode,
        }
    }
}

/// Successful activation.
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    /// Copy of the request descriptor with `location` filled in
    /// (`None` for system mode, which uses the ambient environment).
    pub descriptor: EnvironmentDescriptor,
    pub state: ActivationState,
    pub policy: RefreshPolicy,
    pub fingerprint: Option<Fingerprint>,
    /// Whether `ensure` ran during this call.
    pub rebuilt: bool,
    /// State transitions in order.
    pub transitions: Vec<(ActivationState, ActivationState)>,
    /// Context mutations, for [`Activator::deactivate`].
    pub journal: ContextJournal,
}

impl Activation {
    pub fn location(&self) -> Option<&Path> {
        self.descriptor.location()
    }
}

/// What detection concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Reuse,
    Build { destroy_first: bool },
    NotFound,
}

/// Pure policy table.
pub(crate) fn decide(
    policy: RefreshPolicy,
    exists: bool,
    recorded: Option<&Fingerprint>,
    current: &Fingerprint,
) -> Decision {
    match policy {
        RefreshPolicy::Never if exists => Decision::Reuse,
        RefreshPolicy::Never => Decision::NotFound,
        RefreshPolicy::Always => Decision::Build {
            destroy_first: true,
        },
        RefreshPolicy::Smart if exists && recorded == Some(current) => Decision::Reuse,
        RefreshPolicy::Smart => Decision::Build {
            destroy_first: false,
        },
    }
}

/// Transition bookkeeping for one call.
struct Run<'a> {
    env: &'a str,
    level: LevelFilter,
    state: ActivationState,
    transitions: Vec<(ActivationState, ActivationState)>,
}

impl<'a> Run<'a> {
    fn new(env: &'a str, level: LevelFilter) -> Self {
        Self {
            env,
            level,
            state: ActivationState::Unresolved,
            transitions: Vec::new(),
        }
    }

    fn to(&mut self, next: ActivationState, detail: &str) {
        log::transition(self.level, self.env, self.state, next, detail);
        self.transitions.push((self.state, next));
        self.state = next;
    }

    fn fail(&mut self, err: ActivationError) -> ActivationError {
        self.to(ActivationState::Failed, &err.to_string());
        err
    }

    fn note(&self, level: Level, message: &str) {
        log::note(self.level, level, self.env, message);
    }
}

/// Detects, (re)builds and activates environments through a [`Provisioner`].
pub struct Activator<P: Provisioner> {
    config: ActivatorConfig,
    provisioner: P,
    states: Mutex<HashMap<String, ActivationState>>,
}

impl<P: Provisioner> Activator<P> {
    pub fn new(config: ActivatorConfig, provisioner: P) -> Self {
        Self {
            config,
            provisioner,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ActivatorConfig {
        &self.config
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Last known state of `name` in this process.
    pub fn state(&self, name: &str) -> ActivationState {
        self.states
            .lock()
            .ok()
            .and_then(|s| s.get(name).copied())
            .unwrap_or(ActivationState::Unresolved)
    }

    /// Where an environment with this name lives. Always absolute: a relative
    /// root is taken against the current directory.
    pub fn location_for(&self, name: &str) -> Result<PathBuf, ActivationError> {
        let invalid = |reason: String| ActivationError::InvalidDescriptor {
            name: name.to_string(),
            reason,
        };
        validate_name_token(name).map_err(|e| invalid(e.to_string()))?;
        let root = absolute_root(&self.config.root).map_err(|e| {
            invalid(format!(
                "cannot resolve root {}: {}",
                self.config.root.display(),
                e
            ))
        })?;
        join_under_root(&root, name).map_err(|e| invalid(e.to_string()))
    }

    /// Requirement declarations for `descriptor`: explicit files, or discovery.
    pub fn requirements_for(&self, descriptor: &EnvironmentDescriptor) -> Requirements {
        let files = match descriptor.requirement_files {
            Some(ref files) => files.clone(),
            None => {
                let cwd = if self.config.include_cwd {
                    std::env::current_dir().unwrap_or_else(|_| self.config.project_dir.clone())
                } else {
                    self.config.project_dir.clone()
                };
                requirements::discover(&self.config.project_dir, &cwd)
            }
        };
        requirements::load(&files)
    }

    /// Run the state machine for `request` and, on success, activate the
    /// environment in `ctx`.
    pub fn activate(
        &self,
        ctx: &mut ResolutionContext,
        request: &ActivationRequest,
    ) -> Result<Activation, ActivationError> {
        let name = request.descriptor.name.as_str();
        let mut run = Run::new(name, request.log_level);
        let result = self.run_machine(ctx, request, &mut run);
        if let Ok(mut states) = self.states.lock() {
            states.insert(name.to_string(), run.state);
        }
        result.map(|mut activation| {
            activation.transitions = run.transitions;
            activation
        })
    }

    /// Undo an activation's context changes.
    pub fn deactivate(&self, ctx: &mut ResolutionContext, activation: &Activation) {
        ctx.revert(&activation.journal);
        let name = activation.descriptor.name.as_str();
        if let Ok(mut states) = self.states.lock() {
            states.insert(name.to_string(), ActivationState::Unresolved);
        }
        tracing::info!(env = %name, "deactivated");
    }

    fn run_machine(
        &self,
        ctx: &mut ResolutionContext,
        request: &ActivationRequest,
        run: &mut Run<'_>,
    ) -> Result<Activation, ActivationError> {
        let descriptor = &request.descriptor;

        if descriptor.mode == EnvMode::System {
            // Ambient environment: no filesystem access, no context changes.
            run.to(ActivationState::Active, "using system environment");
            return Ok(Activation {
                descriptor: descriptor.resolved(None),
                state: ActivationState::Active,
                policy: request.policy,
                fingerprint: None,
                rebuilt: false,
                transitions: Vec::new(),
                journal: ContextJournal::default(),
            });
        }

        let location = self.location_for(&descriptor.name).map_err(|e| run.fail(e))?;
        let requirements = self.requirements_for(descriptor);
        if requirements.is_empty() {
            run.note(Level::DEBUG, "no requirements declared");
        }
        let fingerprint = Fingerprint::compute(&self.config.interpreter, &requirements);

        let exists = self.provisioner.exists(&location);
        let recorded = if exists {
            record::load(&location).map(|r| r.fingerprint)
        } else {
            None
        };
        run.note(
            Level::DEBUG,
            &format!(
                "detected: exists={} recorded={} current={}",
                exists,
                recorded.as_ref().map(|f| f.short()).unwrap_or("none"),
                fingerprint.short()
            ),
        );

        let rebuilt = match decide(request.policy, exists, recorded.as_ref(), &fingerprint) {
            Decision::NotFound => {
                return Err(run.fail(ActivationError::EnvironmentNotFound {
                    name: descriptor.name.clone(),
                    location,
                }));
            }
            Decision::Reuse => false,
            Decision::Build { destroy_first } => {
                let why = if !exists {
                    "environment missing"
                } else if destroy_first {
                    "refresh forced"
                } else if recorded.is_none() {
                    "no build record"
                } else {
                    "requirements changed"
                };
                run.to(ActivationState::Building, why);
                self.build(
                    run,
                    descriptor,
                    request.policy,
                    &location,
                    &requirements,
                    &fingerprint,
                    destroy_first,
                )
                .map_err(|e| run.fail(e))?
            }
        };

        let journal = activate_in_context(ctx, &location);
        run.note(
            Level::DEBUG,
            &format!("{} context change(s)", journal.changes().len()),
        );
        run.to(
            ActivationState::Active,
            &format!("activated {}", location.display()),
        );

        Ok(Activation {
            descriptor: descriptor.resolved(Some(location)),
            state: ActivationState::Active,
            policy: request.policy,
            fingerprint: Some(fingerprint),
            rebuilt,
            transitions: Vec::new(),
            journal,
        })
    }

    /// BUILDING. Returns whether `ensure` ran (false when a concurrent
    /// builder already produced a matching environment).
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        run: &Run<'_>,
        descriptor: &EnvironmentDescriptor,
        policy: RefreshPolicy,
        location: &Path,
        requirements: &Requirements,
        fingerprint: &Fingerprint,
        destroy_first: bool,
    ) -> Result<bool, ActivationError> {
        let name = descriptor.name.as_str();
        let provisioning_failed = |reason: String| ActivationError::ProvisioningFailed {
            name: name.to_string(),
            reason,
        };

        let lock_path = lock_path_for(location);
        let _lock = BuildLock::acquire(&lock_path, self.config.lock_mode, self.config.lock_timeout)
            .map_err(|e| match e {
                LockError::Busy { path, waited } => ActivationError::LockTimeout {
                    name: name.to_string(),
                    lock_path: path,
                    waited,
                },
                LockError::Io { .. } => provisioning_failed(e.to_string()),
            })?;

        // Another process may have finished the same build while we waited.
        if policy == RefreshPolicy::Smart && self.provisioner.exists(location) {
            if let Some(current) = record::load(location) {
                if &current.fingerprint == fingerprint {
                    run.note(Level::INFO, "reusing environment built by a concurrent activation");
                    return Ok(false);
                }
            }
        }

        record::remove(location).map_err(|e| provisioning_failed(format!("{:#}", e)))?;

        if destroy_first {
            run.note(Level::DEBUG, "destroying existing environment");
            self.provisioner
                .destroy(location)
                .map_err(|e| provisioning_failed(format!("destroy: {}", e)))?;
        }

        let plan = ProvisionPlan {
            fingerprint: fingerprint.clone(),
            interpreter: self.config.interpreter.clone(),
            requirements: requirements.lines.clone(),
        };
        run.note(
            Level::DEBUG,
            &format!("provisioning {} requirement(s)", plan.requirements.len()),
        );
        self.provisioner
            .ensure(location, &plan, self.config.provision_timeout)
            .map_err(|e| provisioning_failed(e.to_string()))?;

        let build_record = BuildRecord::new(
            name,
            fingerprint.clone(),
            &self.config.interpreter,
            &requirements.lines,
        );
        record::store(location, &build_record)
            .map_err(|e| provisioning_failed(format!("{:#}", e)))?;
        Ok(true)
    }
}

fn absolute_root(root: &Path) -> std::io::Result<PathBuf> {
    if root.is_absolute() {
        Ok(root.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(root))
    }
}

/// Put the environment first on the search path and mark it as the active venv.
fn activate_in_context(ctx: &mut ResolutionContext, location: &Path) -> ContextJournal {
    let mut journal = ContextJournal::default();
    ctx.prepend_path(&bin_dir(location), &mut journal);
    ctx.set_var(VIRTUAL_ENV, &location.to_string_lossy(), &mut journal);
    ctx.unset_var(PYTHONHOME, &mut journal);
    journal
}
