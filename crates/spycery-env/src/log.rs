//! Diagnostic channel for activation. Each call carries its own verbosity;
//! records above it are dropped before they reach the tracing subscriber.
//! Records are also suppressed when SPYCERY_QUIET=1, except warnings and errors.

use tracing::level_filters::LevelFilter;
use tracing::Level;

use crate::descriptor::ActivationState;

pub fn is_quiet() -> bool {
    spycery_core::config::ObservabilityConfig::from_env().quiet
}

fn enabled(threshold: LevelFilter, level: Level) -> bool {
    if level > threshold {
        return false;
    }
    level <= Level::WARN || !is_quiet()
}

/// Level used for a transition into `to`.
pub fn transition_level(to: ActivationState) -> Level {
    match to {
        ActivationState::Failed => Level::WARN,
        ActivationState::Active | ActivationState::Building => Level::INFO,
        ActivationState::Unresolved => Level::DEBUG,
    }
}

/// One record per state transition.
pub fn transition(
    threshold: LevelFilter,
    env: &str,
    from: ActivationState,
    to: ActivationState,
    detail: &str,
) {
    let level = transition_level(to);
    if !enabled(threshold, level) {
        return;
    }
    if level == Level::WARN {
        tracing::warn!(env = %env, from = %from, to = %to, "{}", detail);
    } else if level == Level::INFO {
        tracing::info!(env = %env, from = %from, to = %to, "{}", detail);
    } else {
        tracing::debug!(env = %env, from = %from, to = %to, "{}", detail);
    }
}

/// Free-form record at `level`, gated like transitions.
pub fn note(threshold: LevelFilter, level: Level, env: &str, message: &str) {
    if !enabled(threshold, level) {
        return;
    }
    if level == Level::ERROR {
        tracing::error!(env = %env, "{}", message);
    } else if level == Level::WARN {
        tracing::warn!(env = %env, "{}", message);
    } else if level == Level::INFO {
        tracing::info!(env = %env, "{}", message);
    } else if level == Level::DEBUG {
        tracing::debug!(env = %env, "{}", message);
    } else {
        tracing::trace!(env = %env, "{}", message);
    }
}
