//! Discovery of a client repository's layout: root, source directory,
//! packages and documentation directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::LayoutError;
use crate::policy::{load_project_policy, ProjectPolicy};

/// Files or directories whose presence marks a project root.
pub const ROOT_MARKERS: [&str; 2] = [".git", "pyproject.toml"];

/// Walk upward from `start` until a directory holds one of [`ROOT_MARKERS`].
pub fn find_project_root(start: &Path) -> Result<PathBuf, LayoutError> {
    for dir in start.ancestors() {
        if let Some(marker) = ROOT_MARKERS.iter().find(|m| dir.join(m).exists()) {
            let root = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
            debug!(root = %root.display(), marker, "Project root found");
            return Ok(root);
        }
    }
    Err(LayoutError::RootNotFound {
        start: start.to_path_buf(),
        markers: ROOT_MARKERS.join(", "),
    })
}

/// Everything the tooling needs to know about one checkout.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub project_root: PathBuf,
    pub src_dir: Option<PathBuf>,
    pub docs_dir: PathBuf,
    pub docs_api_dir: PathBuf,
    /// Top-level package directories under `src_dir`, sorted.
    pub packages: Vec<PathBuf>,
    pub org_name: Option<String>,
    pub policy: ProjectPolicy,
}

impl ProjectLayout {
    /// Locate the project root from `start` and inspect it.
    pub fn discover(start: &Path) -> Result<Self, LayoutError> {
        let root = find_project_root(start)?;
        let policy = load_project_policy(Some(&root), None)?;
        Ok(Self::from_root(root, policy))
    }

    /// Inspect a known root with an already loaded policy.
    pub fn from_root(root: PathBuf, policy: ProjectPolicy) -> Self {
        let docs_dir = docs_dir(&root, &policy);
        let docs_api_dir = docs_dir.join(&policy.docs.api_markdown_subdir);
        let src_dir = source_dir(&root, &policy);
        let packages = src_dir.as_deref().map(valid_packages).unwrap_or_default();
        let org_name = org_name(&root);

        let layout = Self {
            project_root: root,
            src_dir,
            docs_dir,
            docs_api_dir,
            packages,
            org_name,
            policy,
        };
        debug!(?layout, "Discovered project layout");
        layout
    }

    /// Name used in generated site titles: the root directory name.
    pub fn project_name(&self) -> String {
        self.project_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }
}

/// Policy `site_dir` or `docs_dir` when that directory exists, else `docs`.
pub fn docs_dir(root: &Path, policy: &ProjectPolicy) -> PathBuf {
    let configured = policy
        .docs
        .site_dir
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(policy.docs.docs_dir.as_str());
    let candidate = root.join(configured);
    if candidate.is_dir() {
        debug!(docs_dir = %candidate.display(), "Docs dir found");
        return candidate;
    }
    root.join("docs")
}

/// First `build.src_dirs` candidate that holds at least one package.
pub fn source_dir(root: &Path, policy: &ProjectPolicy) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = policy.build.src_dirs.iter().map(|s| root.join(s)).collect();
    if candidates.is_empty() {
        candidates.push(root.join("src"));
    }
    let found = candidates
        .into_iter()
        .find(|c| c.is_dir() && !valid_packages(c).is_empty());
    if found.is_none() {
        warn!(
            root = %root.display(),
            src_dirs = ?policy.build.src_dirs,
            "No valid source directory with Python packages found"
        );
    }
    found
}

/// A directory is a package if it has `__init__.py` or any `.py` file.
fn is_python_package(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    if dir.join("__init__.py").exists() {
        return true;
    }
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        })
        .unwrap_or(false)
}

/// Immediate child packages of `src_dir`, sorted by path.
pub fn valid_packages(src_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(src_dir) else {
        return Vec::new();
    };
    let mut packages: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| is_python_package(p))
        .collect();
    packages.sort();
    packages
}

/// Dotted names of every directory under `src_dir` that has `__init__.py`.
pub fn package_names(src_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(src_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.path().join("__init__.py").exists())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(src_dir).ok()?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("."))
        })
        .collect();
    if names.is_empty() {
        warn!(src_dir = %src_dir.display(), "No packages discovered under src");
    }
    names.sort();
    names
}

/// Parent directory name of the root, taken as the organization.
pub fn org_name(root: &Path) -> Option<String> {
    root.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Human-readable summary of a layout.
pub fn format_layout(layout: &ProjectLayout) -> String {
    let display_opt = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    };
    let mut lines = vec![
        format!("Org:      {}", layout.org_name.as_deref().unwrap_or("unknown")),
        format!("Root:     {}", layout.project_root.display()),
        format!("API Docs: {}", layout.docs_api_dir.display()),
        format!("Source:   {}", display_opt(&layout.src_dir)),
        format!("Policy:   {}", layout.policy.policy_path_label()),
        "Packages:".to_string(),
    ];
    if layout.packages.is_empty() {
        lines.push("  (no packages found)".to_string());
    }
    for pkg in &layout.packages {
        let rel = pkg.strip_prefix(&layout.project_root).unwrap_or(pkg);
        lines.push(format!("  - {}", rel.display()));
    }
    lines.join("\n")
}

/// Problems with a discovered layout. Empty means all good.
pub fn verify_layout(layout: &ProjectLayout) -> Vec<String> {
    let mut issues = Vec::new();

    if !layout.project_root.exists() {
        issues.push(format!("Project root not found: {}", layout.project_root.display()));
    } else if !layout.project_root.is_dir() {
        issues.push(format!(
            "Project root is not a directory: {}",
            layout.project_root.display()
        ));
    }

    match &layout.src_dir {
        Some(src) if !src.exists() => {
            issues.push(format!("Missing source directory: {}", src.display()))
        }
        Some(src) if !src.is_dir() => issues.push(format!(
            "Source directory is not a directory: {}",
            src.display()
        )),
        Some(src) if layout.packages.is_empty() => issues.push(format!(
            "No Python packages found under: {}",
            src.display()
        )),
        _ => {}
    }

    if !layout.docs_api_dir.exists() {
        issues.push(format!(
            "Missing API docs source directory: {}",
            layout.docs_api_dir.display()
        ));
    } else if !layout.docs_api_dir.is_dir() {
        issues.push(format!(
            "API docs source directory is not a directory: {}",
            layout.docs_api_dir.display()
        ));
    }

    issues
}

/// Lowercased name with only alphanumerics, `.`, `_` and `-`. Spaces and
/// path separators become `_`; other characters are dropped.
pub fn safe_filename(name: &str, max_length: usize) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }
    let mut result: String = name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || "._-".contains(c) {
                Some(c.to_lowercase().collect::<String>())
            } else if " /\\:".contains(c) {
                Some("_".to_string())
            } else {
                None
            }
        })
        .collect();
    if result.is_empty() {
        result = "file".to_string();
    }
    if result.starts_with('.') {
        result.insert(0, '_');
    }
    if result.chars().count() > max_length {
        result = result.chars().take(max_length).collect();
    }
    let trimmed = result.trim_end_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
