//! Structural policy checks for a client repository.
//!
//! Every check returns human-readable issues; an empty list means the
//! project complies.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::layout::ProjectLayout;
use crate::policy::ProjectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepoType {
    #[default]
    Python,
    Node,
    Pwa,
}

impl FromStr for RepoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(RepoType::Python),
            "node" => Ok(RepoType::Node),
            "pwa" => Ok(RepoType::Pwa),
            other => Err(format!("unknown repo type: {other}. Use python, node or pwa")),
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepoType::Python => "python",
            RepoType::Node => "node",
            RepoType::Pwa => "pwa",
        })
    }
}

fn missing(root: &Path, names: &[String], label: &str) -> Vec<String> {
    names
        .iter()
        .filter(|name| !root.join(name).exists())
        .map(|name| format!("Missing {label}: {name}"))
        .collect()
}

pub fn check_required_files(root: &Path, policy: &ProjectPolicy) -> Vec<String> {
    missing(root, &policy.required_files, "required file")
}

pub fn check_python_project_files(root: &Path, policy: &ProjectPolicy) -> Vec<String> {
    missing(root, &policy.python_project_files, "Python project file")
}

pub fn check_python_project_dirs(root: &Path, policy: &ProjectPolicy) -> Vec<String> {
    policy
        .python_project_dirs
        .iter()
        .filter(|dir| !root.join(dir).exists())
        .map(|dir| format!("Missing Python project directory: {dir}/"))
        .collect()
}

pub fn check_node_project_files(root: &Path, policy: &ProjectPolicy) -> Vec<String> {
    missing(root, &policy.node_project_files, "node project file")
}

pub fn check_pwa_project_files(root: &Path, policy: &ProjectPolicy) -> Vec<String> {
    missing(root, &policy.pwa_project_files, "pwa project file")
}

fn python_files(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "py"))
}

fn display_rel(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// `.py` files under `src_dir` longer than `max_python_file_length` lines.
pub fn check_oversized_py_files(root: &Path, src_dir: &Path, policy: &ProjectPolicy) -> Vec<String> {
    let max = policy.max_python_file_length;
    python_files(src_dir)
        .filter_map(|entry| match fs::read(entry.path()) {
            Ok(bytes) => {
                let lines = String::from_utf8_lossy(&bytes).lines().count();
                (lines > max).then(|| {
                    format!(
                        "Python file too long ({lines} lines): {}",
                        display_rel(entry.path(), root)
                    )
                })
            }
            Err(e) => Some(format!("Could not read file {}: {e}", entry.path().display())),
        })
        .collect()
}

/// `.py` files outside `src_dir`, ignoring scripts at the repository root.
pub fn check_py_files_outside_src(root: &Path, src_dir: &Path) -> Vec<String> {
    python_files(root)
        .filter(|e| !e.path().starts_with(src_dir) && e.path().parent() != Some(root))
        .map(|e| {
            format!(
                "Python file outside src/ directory: {}",
                display_rel(e.path(), root)
            )
        })
        .collect()
}

/// Directories with no entries, skipping `.git`.
pub fn check_empty_dirs(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .filter(|e| {
            fs::read_dir(e.path())
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false)
        })
        .map(|e| format!("Empty directory found: {}", display_rel(e.path(), root)))
        .collect()
}

/// Run the checks that apply to `repo_type`.
pub fn check_policy(
    root: &Path,
    repo_type: RepoType,
    policy: &ProjectPolicy,
    layout: &ProjectLayout,
) -> Vec<String> {
    let mut issues = check_required_files(root, policy);

    match repo_type {
        RepoType::Python => {
            issues.extend(check_python_project_files(root, policy));
            issues.extend(check_python_project_dirs(root, policy));
            match &layout.src_dir {
                Some(src) => {
                    issues.extend(check_oversized_py_files(root, src, policy));
                    issues.extend(check_py_files_outside_src(root, src));
                }
                None => {
                    issues.push("No source directory found. Skipping Python file checks.".to_string())
                }
            }
        }
        RepoType::Node => issues.extend(check_node_project_files(root, policy)),
        RepoType::Pwa => issues.extend(check_pwa_project_files(root, policy)),
    }

    issues.extend(check_empty_dirs(root));

    debug!(?issues, "Policy check details");
    info!(repo_type = %repo_type, issues = issues.len(), "Policy checks complete");
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    fn python_project(root: &Path) {
        for f in ["README.md", "LICENSE", ".gitignore", "pyproject.toml"] {
            write(root.join(f), "x\n").unwrap();
        }
        create_dir_all(root.join("src/pkg")).unwrap();
        create_dir_all(root.join("tests")).unwrap();
        write(root.join("src/pkg/__init__.py"), "").unwrap();
        write(root.join("tests/test_pkg.py"), "def test_ok():\n    pass\n").unwrap();
    }

    #[test]
    fn compliant_python_project_only_flags_test_files_outside_src() {
        let dir = tempdir().unwrap();
        python_project(dir.path());
        let layout = ProjectLayout::from_root(dir.path().to_path_buf(), ProjectPolicy::default());

        let issues = check_policy(dir.path(), RepoType::Python, &layout.policy, &layout);
        assert_eq!(
            issues,
            vec!["Python file outside src/ directory: tests/test_pkg.py".to_string()]
        );
    }

    #[test]
    fn missing_files_oversized_modules_and_empty_dirs_are_reported() {
        let dir = tempdir().unwrap();
        python_project(dir.path());
        std::fs::remove_file(dir.path().join("LICENSE")).unwrap();
        write(dir.path().join("src/pkg/big.py"), "x = 1\n".repeat(5)).unwrap();
        create_dir_all(dir.path().join("data/empty")).unwrap();
        create_dir_all(dir.path().join(".git/refs")).unwrap();

        let policy = ProjectPolicy {
            max_python_file_length: 3,
            ..ProjectPolicy::default()
        };
        let layout = ProjectLayout::from_root(dir.path().to_path_buf(), policy.clone());
        let issues = check_policy(dir.path(), RepoType::Python, &policy, &layout);

        assert!(issues.contains(&"Missing required file: LICENSE".to_string()));
        assert!(issues.contains(&"Python file too long (5 lines): src/pkg/big.py".to_string()));
        assert!(issues.contains(&"Empty directory found: data/empty".to_string()));
        assert!(!issues.iter().any(|i| i.contains(".git")));
    }

    #[test]
    fn node_repos_check_node_files() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::from_root(dir.path().to_path_buf(), ProjectPolicy::default());
        let issues = check_policy(dir.path(), RepoType::Node, &layout.policy, &layout);
        assert!(issues.contains(&"Missing node project file: package.json".to_string()));
        assert!(!issues.iter().any(|i| i.contains("Python")));
    }

    #[test]
    fn repo_type_parses() {
        assert_eq!("PWA".parse::<RepoType>().unwrap(), RepoType::Pwa);
        assert!("java".parse::<RepoType>().is_err());
    }
}
