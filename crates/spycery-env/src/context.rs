//! Resolution context: the search path and variables that tool invocations
//! resolve against.
//!
//! Activation mutates a `ResolutionContext` value instead of the real process
//! environment. Callers push it into a child process with
//! [`ResolutionContext::apply_to_command`], or into the current process with
//! [`ResolutionContext::apply_to_process`]. Every mutation is recorded in a
//! [`ContextJournal`] so it can be undone.

use serde::Serialize;
use spycery_core::config::env_keys::activation::PATH;
use spycery_core::config::{remove_env_var, set_env_var};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolutionContext {
    search_path: Vec<PathBuf>,
    /// Variable overrides: `Some` sets, `None` unsets.
    vars: BTreeMap<String, Option<String>>,
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ContextChange {
    PathPrepended {
        entry: PathBuf,
        /// Where the entry sat before it was moved to the front, if anywhere.
        previous_index: Option<usize>,
    },
    VarChanged {
        key: String,
        /// Override in effect before the change (`None` = no override).
        previous: Option<Option<String>>,
    },
}

/// Ordered list of changes made by one activation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ContextJournal {
    changes: Vec<ContextChange>,
}

impl ContextJournal {
    pub fn changes(&self) -> &[ContextChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl ResolutionContext {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            vars: BTreeMap::new(),
        }
    }

    /// Snapshot of the current process `PATH`.
    pub fn from_process() -> Self {
        let search_path = std::env::var_os(PATH)
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::new(search_path)
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Override value for `key`: `Some(Some(v))` set, `Some(None)` unset,
    /// `None` inherited.
    pub fn var(&self, key: &str) -> Option<Option<&str>> {
        self.vars.get(key).map(|v| v.as_deref())
    }

    /// All variable overrides in key order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Move `entry` to the front of the search path (inserting it if absent).
    pub fn prepend_path(&mut self, entry: &Path, journal: &mut ContextJournal) {
        let previous_index = self.search_path.iter().position(|p| p == entry);
        if let Some(i) = previous_index {
            self.search_path.remove(i);
        }
        self.search_path.insert(0, entry.to_path_buf());
        journal.changes.push(ContextChange::PathPrepended {
            entry: entry.to_path_buf(),
            previous_index,
        });
    }

    pub fn set_var(&mut self, key: &str, value: &str, journal: &mut ContextJournal) {
        let previous = self.vars.insert(key.to_string(), Some(value.to_string()));
        journal.changes.push(ContextChange::VarChanged {
            key: key.to_string(),
            previous,
        });
    }

    pub fn unset_var(&mut self, key: &str, journal: &mut ContextJournal) {
        let previous = self.vars.insert(key.to_string(), None);
        journal.changes.push(ContextChange::VarChanged {
            key: key.to_string(),
            previous,
        });
    }

    /// Undo `journal`, newest change first.
    pub fn revert(&mut self, journal: &ContextJournal) {
        for change in journal.changes.iter().rev() {
            match change {
                ContextChange::PathPrepended {
                    entry,
                    previous_index,
                } => {
                    if let Some(pos) = self.search_path.iter().position(|p| p == entry) {
                        self.search_path.remove(pos);
                    }
                    if let Some(i) = *previous_index {
                        let i = i.min(self.search_path.len());
                        self.search_path.insert(i, entry.clone());
                    }
                }
                ContextChange::VarChanged { key, previous } => match previous {
                    Some(value) => {
                        self.vars.insert(key.clone(), value.clone());
                    }
                    None => {
                        self.vars.remove(key);
                    }
                },
            }
        }
    }

    /// Search path joined with the platform separator.
    pub fn path_var(&self) -> Result<OsString, std::env::JoinPathsError> {
        std::env::join_paths(&self.search_path)
    }

    /// Resolve an executable name against this context's search path.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        let path = self.path_var().ok()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(program, Some(path), cwd).ok()
    }

    /// Configure a child process to run inside this context.
    pub fn apply_to_command(&self, cmd: &mut Command) -> Result<(), std::env::JoinPathsError> {
        cmd.env(PATH, self.path_var()?);
        for (key, value) in &self.vars {
            match value {
                Some(v) => {
                    cmd.env(key, v);
                }
                None => {
                    cmd.env_remove(key);
                }
            }
        }
        Ok(())
    }

    /// Write this context into the current process environment.
    ///
    /// Must run before other threads read the environment.
    pub fn apply_to_process(&self) -> Result<(), std::env::JoinPathsError> {
        let path = self.path_var()?;
        set_env_var(PATH, &path.to_string_lossy());
        for (key, value) in &self.vars {
            match value {
                Some(v) => set_env_var(key, v),
                None => remove_env_var(key),
            }
        }
        Ok(())
    }
}
