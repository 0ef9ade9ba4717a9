//! Path validation utilities.
//!
//! Environment names become directory names under the environment root, so
//! they must be plain filesystem-safe tokens that cannot escape that root.

use anyhow::Result;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Longest accepted environment name.
pub const MAX_NAME_LEN: usize = 128;

/// Reasons an environment name is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,

    #[error("name is longer than {MAX_NAME_LEN} characters")]
    TooLong,

    #[error("name '{0}' is reserved")]
    Reserved(String),

    #[error("name '{0}' must start with a letter or digit and contain only letters, digits, '.', '_' or '-'")]
    InvalidCharacters(String),
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static name pattern compiles")
    })
}

/// Validate that `name` is usable as a single path component.
pub fn validate_name_token(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }
    if !name_pattern().is_match(name) {
        return Err(NameError::InvalidCharacters(name.to_string()));
    }
    // Windows device names
    let stem = name.split('.').next().unwrap_or(name).to_ascii_uppercase();
    if matches!(stem.as_str(), "CON" | "PRN" | "AUX" | "NUL")
        || ((stem.starts_with("COM") || stem.starts_with("LPT"))
            && stem.len() == 4
            && stem.as_bytes()[3].is_ascii_digit())
    {
        return Err(NameError::Reserved(name.to_string()));
    }
    Ok(())
}

/// Join `relative` onto `root`, rejecting absolute paths and `..` components.
/// Works for paths that do not exist yet.
pub fn join_under_root(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => anyhow::bail!("path escapes environment root: {}", relative),
        }
    }
    Ok(root.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_tokens() {
        for name in ["venv", "tooling", "py3.11-env", "a", "Build_2"] {
            assert_eq!(validate_name_token(name), Ok(()), "{}", name);
        }
    }

    #[test]
    fn test_rejects_unsafe_tokens() {
        assert_eq!(validate_name_token(""), Err(NameError::Empty));
        assert!(matches!(
            validate_name_token("../escape"),
            Err(NameError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_name_token(".hidden"),
            Err(NameError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_name_token("a/b"),
            Err(NameError::InvalidCharacters(_))
        ));
        assert!(matches!(
            validate_name_token("has space"),
            Err(NameError::InvalidCharacters(_))
        ));
        assert!(matches!(validate_name_token("nul"), Err(NameError::Reserved(_))));
        assert!(matches!(validate_name_token("COM1.env"), Err(NameError::Reserved(_))));
        assert_eq!(
            validate_name_token(&"x".repeat(MAX_NAME_LEN + 1)),
            Err(NameError::TooLong)
        );
    }

    #[test]
    fn test_join_under_root() {
        let root = Path::new("/envs");
        assert_eq!(join_under_root(root, "venv").unwrap(), root.join("venv"));
        assert!(join_under_root(root, "../outside").is_err());
        assert!(join_under_root(root, "/abs").is_err());
    }
}
