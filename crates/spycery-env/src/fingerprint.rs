//! Build fingerprint: SHA-256 over declared inputs only.
//!
//! Nothing inside the environment itself is hashed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::requirements::Requirements;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the interpreter declaration and the normalized requirement lines.
    /// Source file paths are not part of the hash.
    pub fn compute(interpreter: &str, requirements: &Requirements) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"interpreter\0");
        hasher.update(interpreter.as_bytes());
        hasher.update(b"\0requirements\0");
        for line in &requirements.lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// 64 lowercase or uppercase hex digits, as produced by [`Fingerprint::compute`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(lines: &[&str]) -> Requirements {
        Requirements {
            sources: Vec::new(),
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::compute("python3", &reqs(&["numpy", "pandas"]));
        let b = Fingerprint::compute("python3", &reqs(&["numpy", "pandas"]));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64); // SHA256 hex
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_short_and_well_formed_on_foreign_input() {
        let odd = Fingerprint("aéééééééé".to_string());
        assert_eq!(odd.short(), "aéééééééé");
        assert!(!odd.is_well_formed());
        assert!(Fingerprint::compute("python3", &reqs(&[])).is_well_formed());
    }

    #[test]
    fn test_fingerprint_sensitive_to_declarations() {
        let base = Fingerprint::compute("python3", &reqs(&["numpy"]));
        assert_ne!(base, Fingerprint::compute("python3", &reqs(&["numpy==1.26"])));
        assert_ne!(base, Fingerprint::compute("python3.12", &reqs(&["numpy"])));
        // line boundaries matter
        assert_ne!(
            Fingerprint::compute("python3", &reqs(&["ab", "c"])),
            Fingerprint::compute("python3", &reqs(&["a", "bc"]))
        );
    }

    #[test]
    fn test_fingerprint_ignores_source_paths() {
        let mut moved = reqs(&["numpy"]);
        moved.sources.push("/elsewhere/requirements.txt".into());
        assert_eq!(
            Fingerprint::compute("python3", &reqs(&["numpy"])),
            Fingerprint::compute("python3", &moved)
        );
    }
}
