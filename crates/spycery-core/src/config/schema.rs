//! Configuration structs grouped by concern.
//!
//! Loaded from environment variables with a single fallback policy.

use super::env_keys::{env as env_keys, observability as obv_keys};
use super::loader::{env_bool, env_optional, env_or, env_u64};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ENV_NAME: &str = "venv";
pub const DEFAULT_PROVISION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

/// What a second builder does when another process holds the build lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Wait for the lock (bounded by the lock timeout), then re-check state.
    #[default]
    Block,
    /// Report the held lock immediately.
    FailFast,
}

impl FromStr for LockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" | "wait" => Ok(Self::Block),
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            other => Err(format!("unknown lock mode '{}' (expected block or fail-fast)", other)),
        }
    }
}

/// Environment location and provisioning settings.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Directory that holds named environments.
    pub root: PathBuf,
    pub default_name: String,
    /// Explicit interpreter for venv creation; `None` means look up python3/python on PATH.
    pub python: Option<String>,
    pub provision_timeout: Duration,
    pub lock_timeout: Duration,
    pub lock_mode: LockMode,
}

impl EnvConfig {
    /// Load from environment (reads `.env` once).
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let root = env_optional(env_keys::SPYCERY_ENV_ROOT, env_keys::ENV_ROOT_ALIASES)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let default_name = env_or(env_keys::SPYCERY_ENV_NAME, &[], || {
            DEFAULT_ENV_NAME.to_string()
        });
        let python = env_optional(env_keys::SPYCERY_PYTHON, env_keys::PYTHON_ALIASES);
        let provision_timeout = Duration::from_secs(env_u64(
            env_keys::SPYCERY_PROVISION_TIMEOUT_SECS,
            &[],
            DEFAULT_PROVISION_TIMEOUT_SECS,
        ));
        let lock_timeout = Duration::from_secs(env_u64(
            env_keys::SPYCERY_LOCK_TIMEOUT_SECS,
            &[],
            DEFAULT_LOCK_TIMEOUT_SECS,
        ));
        let lock_mode = match env_optional(env_keys::SPYCERY_LOCK_MODE, &[]) {
            Some(s) => s.parse().unwrap_or_else(|e: String| {
                tracing::warn!("Invalid {}: {}, using block", env_keys::SPYCERY_LOCK_MODE, e);
                LockMode::Block
            }),
            None => LockMode::Block,
        };
        Self {
            root,
            default_name,
            python,
            provision_timeout,
            lock_timeout,
            lock_mode,
        }
    }

    /// Override with CLI parameters.
    pub fn with_cli_overrides(
        mut self,
        root: Option<PathBuf>,
        provision_timeout_secs: Option<u64>,
        lock_timeout_secs: Option<u64>,
        lock_mode: Option<LockMode>,
    ) -> Self {
        if let Some(root) = root {
            self.root = root;
        }
        if let Some(secs) = provision_timeout_secs {
            self.provision_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lock_timeout_secs {
            self.lock_timeout = Duration::from_secs(secs);
        }
        if let Some(mode) = lock_mode {
            self.lock_mode = mode;
        }
        self
    }
}

/// Observability: quiet, log_level, log_json, log_mode, log_dir
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub log_mode: String,
    pub log_dir: String,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::SPYCERY_QUIET, &[], false),
                log_level: env_or(obv_keys::SPYCERY_LOG_LEVEL, &[], || {
                    "spycery=info,spycery_env=info".to_string()
                }),
                log_json: env_bool(obv_keys::SPYCERY_LOG_JSON, &[], false),
                log_mode: env_or(obv_keys::SPYCERY_LOG_MODE, &[], || "console".to_string()),
                log_dir: env_or(obv_keys::SPYCERY_LOG_DIR, &[], || "results".to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_mode_parse() {
        assert_eq!("block".parse::<LockMode>().unwrap(), LockMode::Block);
        assert_eq!("Fail-Fast".parse::<LockMode>().unwrap(), LockMode::FailFast);
        assert!("sometimes".parse::<LockMode>().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cfg = EnvConfig {
            root: PathBuf::from("/tmp/envs"),
            default_name: DEFAULT_ENV_NAME.to_string(),
            python: None,
            provision_timeout: Duration::from_secs(DEFAULT_PROVISION_TIMEOUT_SECS),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            lock_mode: LockMode::Block,
        }
        .with_cli_overrides(
            Some(PathBuf::from("/srv/envs")),
            Some(5),
            None,
            Some(LockMode::FailFast),
        );
        assert_eq!(cfg.root, PathBuf::from("/srv/envs"));
        assert_eq!(cfg.provision_timeout, Duration::from_secs(5));
        assert_eq!(cfg.lock_timeout, Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS));
        assert_eq!(cfg.lock_mode, LockMode::FailFast);
    }
}
