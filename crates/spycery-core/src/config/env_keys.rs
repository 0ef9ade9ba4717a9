//! Environment variable keys.
//!
//! Primary variables use the `SPYCERY_*` prefix; a few accept conventional aliases.

/// Environment location and provisioning
pub mod env {
    /// Directory holding named environments (`<root>/<name>`).
    pub const SPYCERY_ENV_ROOT: &str = "SPYCERY_ENV_ROOT";
    pub const ENV_ROOT_ALIASES: &[&str] = &["WORKON_HOME"];

    /// Default environment name when none is given on the command line.
    pub const SPYCERY_ENV_NAME: &str = "SPYCERY_ENV_NAME";

    /// Interpreter used to create virtual environments.
    pub const SPYCERY_PYTHON: &str = "SPYCERY_PYTHON";
    pub const PYTHON_ALIASES: &[&str] = &["PYTHON"];

    pub const SPYCERY_PROVISION_TIMEOUT_SECS: &str = "SPYCERY_PROVISION_TIMEOUT_SECS";
    pub const SPYCERY_LOCK_TIMEOUT_SECS: &str = "SPYCERY_LOCK_TIMEOUT_SECS";

    /// "block" (default) or "fail-fast".
    pub const SPYCERY_LOCK_MODE: &str = "SPYCERY_LOCK_MODE";
}

/// Observability and logging
pub mod observability {
    pub const SPYCERY_QUIET: &str = "SPYCERY_QUIET";
    pub const SPYCERY_LOG_LEVEL: &str = "SPYCERY_LOG_LEVEL";
    pub const SPYCERY_LOG_JSON: &str = "SPYCERY_LOG_JSON";

    /// "none", "console" (default) or "file".
    pub const SPYCERY_LOG_MODE: &str = "SPYCERY_LOG_MODE";
    pub const SPYCERY_LOG_DIR: &str = "SPYCERY_LOG_DIR";
}

/// Variables written into the resolution context on activation.
pub mod activation {
    pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";
    pub const PYTHONHOME: &str = "PYTHONHOME";
    pub const PATH: &str = "PATH";
}
