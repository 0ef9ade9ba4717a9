//! Unified configuration layer.
//!
//! All environment-variable reads go through this module; callers use the
//! structured configs instead of calling `std::env::var` directly.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, `env_u64` helpers
//! - `schema`: `EnvConfig`, `ObservabilityConfig`
//! - `env_keys`: key constants and aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{
    env_bool, env_optional, env_or, env_u64, load_dotenv, load_dotenv_from_dir, remove_env_var,
    set_env_var,
};
pub use schema::{EnvConfig, LockMode, ObservabilityConfig};
