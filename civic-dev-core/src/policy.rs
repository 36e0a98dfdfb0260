//! Project policy: built-in defaults overlaid with a project's own
//! `project_policy.yaml`.
//!
//! The defaults ship inside the crate (`project_policy.yaml` next to this
//! file). A client repository overrides any subset of keys; nested mappings
//! merge recursively, scalars and lists are replaced. The merged document is
//! deserialized once into an immutable [`ProjectPolicy`] that callers pass
//! around explicitly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use tracing::{debug, error, info};

use crate::error::ConfigError;

/// File name looked up at the project root.
pub const POLICY_FILENAME: &str = "project_policy.yaml";

const DEFAULT_POLICY_YAML: &str = include_str!("project_policy.yaml");

/// Label recorded as `policy_path` when no project file was merged.
pub const BUILTIN_POLICY_LABEL: &str = "<built-in>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectPolicy {
    pub log_level: String,
    pub log_subdir: String,
    pub log_file_prefix: String,
    pub log_retention_days: usize,
    pub max_python_file_length: usize,
    pub required_files: Vec<String>,
    pub python_project_files: Vec<String>,
    pub python_project_dirs: Vec<String>,
    pub node_project_files: Vec<String>,
    pub pwa_project_files: Vec<String>,
    pub build: BuildPolicy,
    pub docs: DocsPolicy,
    /// Policy file in effect, set by the loader.
    #[serde(skip)]
    pub policy_path: Option<PathBuf>,
}

impl Default for ProjectPolicy {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_subdir: "logs".to_string(),
            log_file_prefix: "civic-dev".to_string(),
            log_retention_days: 7,
            max_python_file_length: 1000,
            required_files: strings(&["README.md", "LICENSE", ".gitignore"]),
            python_project_files: strings(&["pyproject.toml"]),
            python_project_dirs: strings(&["src", "tests"]),
            node_project_files: strings(&["package.json"]),
            pwa_project_files: strings(&["manifest.json", "index.html"]),
            build: BuildPolicy::default(),
            docs: DocsPolicy::default(),
            policy_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildPolicy {
    /// Candidate source directories, a single string is accepted too.
    #[serde(deserialize_with = "string_or_list")]
    pub src_dirs: Vec<String>,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self {
            src_dirs: strings(&["src"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsPolicy {
    pub docs_dir: String,
    pub site_dir: Option<String>,
    pub api_markdown_subdir: String,
    pub site: SitePolicy,
}

impl Default for DocsPolicy {
    fn default() -> Self {
        Self {
            docs_dir: "docs".to_string(),
            site_dir: None,
            api_markdown_subdir: "api".to_string(),
            site: SitePolicy::default(),
        }
    }
}

/// Everything the generated site configuration and home page need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitePolicy {
    /// Full site name; when absent it is `"<project> <site_name_suffix>"`.
    pub site_name: Option<String>,
    pub site_name_suffix: String,
    /// `{project}` is replaced with the project name.
    pub description_template: String,
    pub theme: ThemePolicy,
    pub plugins: Vec<String>,
    pub markdown_extensions: Vec<String>,
    pub home_title: String,
    pub home_body: String,
}

impl Default for SitePolicy {
    fn default() -> Self {
        Self {
            site_name: None,
            site_name_suffix: "Documentation".to_string(),
            description_template: "Documentation for {project}".to_string(),
            theme: ThemePolicy::default(),
            plugins: strings(&["search"]),
            markdown_extensions: strings(&["toc", "codehilite", "admonition"]),
            home_title: "Civic Interconnect Project Documentation".to_string(),
            home_body: "Welcome to the documentation hub for Civic Interconnect (CI) projects.\n\n\
                        Use the navigation menu to explore available modules, APIs, and tools.\n\n\
                        For more information, visit the [Civic Interconnect GitHub organization](https://github.com/civic-interconnect).\n"
                .to_string(),
        }
    }
}

impl SitePolicy {
    pub fn site_name_for(&self, project: &str) -> String {
        self.site_name
            .clone()
            .unwrap_or_else(|| format!("{project} {}", self.site_name_suffix))
    }

    pub fn description_for(&self, project: &str) -> String {
        self.description_template.replace("{project}", project)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemePolicy {
    pub name: String,
    pub palette: Vec<PaletteEntry>,
    pub features: Vec<String>,
}

impl Default for ThemePolicy {
    fn default() -> Self {
        Self {
            name: "material".to_string(),
            palette: vec![PaletteEntry {
                scheme: "default".to_string(),
                primary: "indigo".to_string(),
                accent: "indigo".to_string(),
            }],
            features: strings(&["navigation.expand"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub scheme: String,
    pub primary: String,
    pub accent: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Recursively merge `over` into `base`. Mappings merge key by key; any
/// other value in `over` replaces the one in `base`. A null override keeps
/// the base value.
pub fn overlay(base: &mut Value, over: Value) {
    match (base, over) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(over_map)) => {
            for (key, value) in over_map {
                match base_map.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn builtin_defaults() -> Result<Value, ConfigError> {
    serde_yaml::from_str(DEFAULT_POLICY_YAML).map_err(ConfigError::Defaults)
}

/// Load the effective policy.
///
/// `override_file` wins over `<project_root>/project_policy.yaml`. A missing
/// project file is not an error; a malformed one is.
pub fn load_project_policy(
    project_root: Option<&Path>,
    override_file: Option<&Path>,
) -> Result<ProjectPolicy, ConfigError> {
    let mut merged = builtin_defaults()?;

    let custom_path = match (override_file, project_root) {
        (Some(file), _) => Some(file.to_path_buf()),
        (None, Some(root)) => Some(root.join(POLICY_FILENAME)),
        (None, None) => None,
    };

    let mut policy_path = None;
    if let Some(path) = custom_path.filter(|p| p.exists()) {
        let content = fs::read_to_string(&path).map_err(|source| {
            error!(error = ?source, policy_path = %path.display(), "Failed to read policy file");
            ConfigError::Io {
                path: path.clone(),
                source,
            }
        })?;
        let custom: Value = match serde_yaml::from_str(&content) {
            Ok(v) => v,
            Err(source) => {
                error!(error = ?source, policy_path = %path.display(), "Failed to parse custom policy");
                return Err(ConfigError::Parse { path, source });
            }
        };
        overlay(&mut merged, custom);
        debug!(policy_path = %path.display(), "Loaded custom policy");
        policy_path = Some(path);
    }

    let mut policy: ProjectPolicy = match serde_yaml::from_value(merged) {
        Ok(p) => p,
        Err(source) => {
            let path = policy_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(BUILTIN_POLICY_LABEL));
            error!(error = ?source, policy_path = %path.display(), "Policy does not match the expected shape");
            return Err(ConfigError::Parse { path, source });
        }
    };
    policy.policy_path = policy_path;

    info!(
        policy_path = %policy.policy_path_label(),
        log_level = %policy.log_level,
        "Project policy loaded"
    );
    Ok(policy)
}

impl ProjectPolicy {
    pub fn policy_path_label(&self) -> String {
        self.policy_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| BUILTIN_POLICY_LABEL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[test]
    fn embedded_defaults_match_the_typed_defaults() {
        let parsed: ProjectPolicy = serde_yaml::from_value(builtin_defaults().unwrap()).unwrap();
        assert_eq!(parsed, ProjectPolicy::default());
    }

    #[test]
    fn overlay_merges_nested_mappings_and_replaces_lists() {
        let mut base: Value = serde_yaml::from_str("a: {x: 1, y: 2}\nlist: [1, 2]\nkeep: yes").unwrap();
        let over: Value = serde_yaml::from_str("a: {y: 3, z: 4}\nlist: [9]\nkeep: ~").unwrap();
        overlay(&mut base, over);
        let expected: Value =
            serde_yaml::from_str("a: {x: 1, y: 3, z: 4}\nlist: [9]\nkeep: yes").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        write(
            dir.path().join(POLICY_FILENAME),
            "log_level: DEBUG\ndocs:\n  api_markdown_subdir: reference\n  site:\n    plugins: [search, mermaid]\nbuild:\n  src_dirs: lib\n",
        )
        .unwrap();

        let policy = load_project_policy(Some(dir.path()), None).unwrap();
        assert_eq!(policy.log_level, "DEBUG");
        assert_eq!(policy.docs.api_markdown_subdir, "reference");
        assert_eq!(policy.docs.docs_dir, "docs");
        assert_eq!(policy.docs.site.plugins, vec!["search", "mermaid"]);
        assert_eq!(policy.docs.site.theme.name, "material");
        assert_eq!(policy.build.src_dirs, vec!["lib"]);
        assert_eq!(policy.policy_path, Some(dir.path().join(POLICY_FILENAME)));
    }

    #[test]
    fn missing_project_file_uses_builtin_defaults() {
        let dir = tempdir().unwrap();
        let policy = load_project_policy(Some(dir.path()), None).unwrap();
        assert_eq!(policy.policy_path, None);
        assert_eq!(policy.policy_path_label(), BUILTIN_POLICY_LABEL);
        assert_eq!(policy.max_python_file_length, 1000);
    }

    #[test]
    fn malformed_project_file_is_an_error() {
        let dir = tempdir().unwrap();
        write(dir.path().join(POLICY_FILENAME), "not-yaml: [:::").unwrap();
        let err = load_project_policy(Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn site_names_come_from_the_policy() {
        let site = SitePolicy::default();
        assert_eq!(site.site_name_for("civic-lib"), "civic-lib Documentation");
        assert_eq!(site.description_for("civic-lib"), "Documentation for civic-lib");
    }
}
