//! Version strings: parsing, compatibility, discovery and bumping.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::VERSION_FILENAME;
use crate::error::VersionError;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)").unwrap());

/// Files rewritten by [`bump_version`], relative to the project root.
pub const VERSIONED_FILES: [&str; 4] = ["pyproject.toml", "README.md", VERSION_FILENAME, "package.json"];

/// Fallback when no version source exists.
pub const UNKNOWN_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s)
    }
}

/// Parse the leading `MAJOR.MINOR.PATCH` of `version`. Anything after the
/// patch number (pre-release tags, build metadata) is ignored.
pub fn parse_version(version: &str) -> Result<Version, VersionError> {
    let invalid = || VersionError::Invalid(version.to_string());
    let caps = VERSION_RE.captures(version.trim()).ok_or_else(invalid)?;
    let part = |i: usize| caps[i].parse::<u64>().map_err(|_| invalid());
    Ok(Version {
        major: part(1)?,
        minor: part(2)?,
        patch: part(3)?,
    })
}

/// Whether an agent built against `lib_version` can run with `agent_version`.
///
/// Compatible means same major version, or identical versions when
/// `strict`. Unparsable input is incompatible.
pub fn check_version(agent_version: &str, lib_version: &str, strict: bool) -> bool {
    let (agent, lib) = match (parse_version(agent_version), parse_version(lib_version)) {
        (Ok(a), Ok(l)) => (a, l),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Version check failed");
            return false;
        }
    };

    if strict {
        if agent != lib {
            warn!(agent = %agent_version, lib = %lib_version, "Strict version mismatch");
            return false;
        }
        return true;
    }

    if agent.major != lib.major {
        warn!(agent = %agent_version, lib = %lib_version, "Major version mismatch");
        return false;
    }
    true
}

#[derive(Deserialize)]
struct PyProject {
    project: Option<PyProjectTable>,
}

#[derive(Deserialize)]
struct PyProjectTable {
    version: Option<String>,
}

#[derive(Deserialize)]
struct PackageJson {
    version: Option<String>,
}

fn version_from_pyproject(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    match toml::from_str::<PyProject>(&content) {
        Ok(doc) => doc.project?.version.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Error parsing pyproject.toml");
            None
        }
    }
}

fn version_from_file(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    Some(content.trim().to_string()).filter(|v| !v.is_empty())
}

fn version_from_package_json(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<PackageJson>(&content) {
        Ok(doc) => doc.version.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Error reading package.json");
            None
        }
    }
}

/// Project version from `pyproject.toml`, `VERSION` or `package.json`, in
/// that order, else [`UNKNOWN_VERSION`].
pub fn repo_version(root: &Path) -> String {
    let sources: [(&str, fn(&Path) -> Option<String>); 3] = [
        ("pyproject.toml", version_from_pyproject),
        (VERSION_FILENAME, version_from_file),
        ("package.json", version_from_package_json),
    ];
    for (file, read) in sources {
        if let Some(version) = read(&root.join(file)) {
            info!(source = file, %version, "Version found");
            return version;
        }
    }
    info!("No version found in repo. Defaulting to {UNKNOWN_VERSION}");
    UNKNOWN_VERSION.to_string()
}

/// Replace every occurrence of `old` with `new` in `path`.
///
/// Returns whether the file changed. A missing file is skipped.
pub fn update_file(path: &Path, old: &str, new: &str) -> Result<bool, VersionError> {
    if !path.exists() {
        info!(path = %path.display(), "Skipping (not found)");
        return Ok(false);
    }
    let io_err = |source| VersionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = fs::read_to_string(path).map_err(io_err)?;
    let updated = content.replace(old, new);
    if updated == content {
        debug!(path = %path.display(), "No changes needed");
        return Ok(false);
    }
    fs::write(path, updated).map_err(io_err)?;
    info!(path = %path.display(), "Updated");
    Ok(true)
}

/// Rewrite `old` to `new` in every file of [`VERSIONED_FILES`] under
/// `root`. Returns the number of files changed.
pub fn bump_version(root: &Path, old: &str, new: &str) -> Result<usize, VersionError> {
    let mut updated = 0;
    for file in VERSIONED_FILES {
        let path: PathBuf = root.join(file);
        if update_file(&path, old, new)? {
            updated += 1;
        }
    }
    if updated > 0 {
        info!(updated, "{updated} file(s) updated.");
    } else {
        info!("No files were updated.");
    }
    Ok(updated)
}
