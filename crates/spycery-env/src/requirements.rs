//! Requirement declarations: discover `requirements.txt` files and normalize their lines.

use std::path::{Path, PathBuf};

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Normalized requirement lines plus the files they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    pub sources: Vec<PathBuf>,
    pub lines: Vec<String>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// `requirements.txt` in `project_dir` and each ancestor, nearest first, then
/// in `cwd`. Only existing files are returned, without duplicates.
pub fn discover(project_dir: &Path, cwd: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    let start = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());
    let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    for dir in start.ancestors().chain(std::iter::once(cwd.as_path())) {
        let candidate = dir.join(REQUIREMENTS_FILE);
        if candidate.is_file() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    found
}

/// Read and normalize requirement files. Unreadable files are skipped with a
/// warning.
pub fn load(files: &[PathBuf]) -> Requirements {
    let mut reqs = Requirements::default();
    for file in files {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                for line in parse_lines(&content) {
                    if !reqs.lines.contains(&line) {
                        reqs.lines.push(line);
                    }
                }
                reqs.sources.push(file.clone());
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable requirements file");
            }
        }
    }
    reqs
}

/// Trimmed, non-empty, non-comment lines in file order.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_skips_comments_and_blanks() {
        let lines = parse_lines("# pinned\nrequests==2.31\n\n   numpy  \n#pandas\n");
        assert_eq!(lines, vec!["requests==2.31", "numpy"]);
    }

    #[test]
    fn test_discover_walks_ancestors_then_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let project = root.join("a").join("b");
        std::fs::create_dir_all(&project).unwrap();
        let other = root.join("elsewhere");
        std::fs::create_dir_all(&other).unwrap();

        std::fs::write(project.join(REQUIREMENTS_FILE), "numpy\n").unwrap();
        std::fs::write(root.join("a").join(REQUIREMENTS_FILE), "pandas\n").unwrap();
        std::fs::write(other.join(REQUIREMENTS_FILE), "requests\n").unwrap();

        let found = discover(&project, &other);
        assert_eq!(
            found,
            vec![
                project.join(REQUIREMENTS_FILE),
                root.join("a").join(REQUIREMENTS_FILE),
                other.join(REQUIREMENTS_FILE),
            ]
        );
    }

    #[test]
    fn test_discover_deduplicates_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::write(root.join(REQUIREMENTS_FILE), "numpy\n").unwrap();
        assert_eq!(discover(&root, &root), vec![root.join(REQUIREMENTS_FILE)]);
    }

    #[test]
    fn test_load_merges_and_skips_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        std::fs::write(&a, "numpy\nrequests\n").unwrap();
        std::fs::write(&b, "requests\npandas\n").unwrap();
        let missing = tmp.path().join("missing.txt");

        let reqs = load(&[a.clone(), missing, b.clone()]);
        assert_eq!(reqs.lines, vec!["numpy", "requests", "pandas"]);
        assert_eq!(reqs.sources, vec![a, b]);
    }
}
