//! Documentation site scaffolding: API navigation, `mkdocs.yml` and the
//! home page, plus [`publish_api_docs`] which runs the whole pipeline for a
//! discovered project.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::contract::{ApiExtractor, ApiIndex};
use crate::error::DocsError;
use crate::extract::extract_module_api;
use crate::layout::ProjectLayout;
use crate::policy::{DocsPolicy, SitePolicy, ThemePolicy};
use crate::render::{write_formats, OutputFormat};

pub const SITE_CONFIG_FILENAME: &str = "mkdocs.yml";
pub const HOME_PAGE_FILENAME: &str = "index.md";

/// Target of a navigation entry: a page path or a nested section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NavTarget {
    Page(String),
    Section(Vec<NavEntry>),
}

/// One navigation entry, serialized as a single-key mapping
/// (`{title: target}`).
#[derive(Debug, Clone, PartialEq)]
pub struct NavEntry {
    pub title: String,
    pub target: NavTarget,
}

impl NavEntry {
    pub fn page(title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            target: NavTarget::Page(path.into()),
        }
    }

    pub fn section(title: impl Into<String>, entries: Vec<NavEntry>) -> Self {
        Self {
            title: title.into(),
            target: NavTarget::Section(entries),
        }
    }
}

impl Serialize for NavEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.title, &self.target)?;
        map.end()
    }
}

/// Generated site configuration. Field order is the file's key order.
#[derive(Debug, Clone, Serialize)]
pub struct SiteConfig {
    pub site_name: String,
    pub site_description: String,
    pub theme: ThemePolicy,
    pub nav: Vec<NavEntry>,
    pub plugins: Vec<String>,
    pub markdown_extensions: Vec<String>,
}

/// `str.title()` as Python does it: a letter is uppercased when it follows a
/// non-letter, lowercased otherwise.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}

fn relative_target(path: &Path, docs_root: &Path) -> String {
    let rel = path.strip_prefix(docs_root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// One flat entry per `.md` file in `api_dir`, sorted by file name.
///
/// A missing directory or one without pages is [`DocsError::NoMarkdown`].
pub fn build_api_nav(api_dir: &Path, docs_root: &Path) -> Result<Vec<NavEntry>, DocsError> {
    let entries = match fs::read_dir(api_dir) {
        Ok(entries) => entries,
        Err(_) => {
            error!(api_dir = %api_dir.display(), "Missing API docs directory");
            return Err(DocsError::NoMarkdown(api_dir.to_path_buf()));
        }
    };

    let mut pages: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    pages.sort();

    if pages.is_empty() {
        error!(api_dir = %api_dir.display(), "No markdown files found. Navigation would be empty.");
        return Err(DocsError::NoMarkdown(api_dir.to_path_buf()));
    }

    let nav: Vec<NavEntry> = pages
        .iter()
        .map(|page| {
            let stem = page
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            NavEntry::page(title_case(&stem.replace('_', " ")), relative_target(page, docs_root))
        })
        .collect();
    info!(count = nav.len(), "Included API modules in site navigation");
    Ok(nav)
}

/// Build the site configuration for `project_name` and write it to
/// `<root_dir>/mkdocs.yml`.
pub fn generate_site_config(
    project_name: &str,
    root_dir: &Path,
    api_dir: &Path,
    docs_root: &Path,
    docs: &DocsPolicy,
) -> Result<PathBuf, DocsError> {
    if !root_dir.is_dir() {
        error!(root = %root_dir.display(), "Project root not found. Cannot generate site config.");
        return Err(DocsError::io(root_dir, io::Error::from(io::ErrorKind::NotFound)));
    }

    let api_nav = build_api_nav(api_dir, docs_root)?;
    let site = &docs.site;
    let config = SiteConfig {
        site_name: site.site_name_for(project_name),
        site_description: site.description_for(project_name),
        theme: site.theme.clone(),
        nav: vec![
            NavEntry::page("Home", HOME_PAGE_FILENAME),
            NavEntry::section("API Reference", api_nav),
        ],
        plugins: site.plugins.clone(),
        markdown_extensions: site.markdown_extensions.clone(),
    };

    let config_path = root_dir.join(SITE_CONFIG_FILENAME);
    let body = serde_yaml::to_string(&config)?;
    fs::write(&config_path, body).map_err(|e| DocsError::io(&config_path, e))?;
    info!(path = %config_path.display(), "Site config written");
    Ok(config_path)
}

/// Write `<docs_dir>/index.md` from the policy's home page title and body.
pub fn write_index_md(docs_dir: &Path, site: &SitePolicy) -> Result<PathBuf, DocsError> {
    fs::create_dir_all(docs_dir).map_err(|e| DocsError::io(docs_dir, e))?;
    let index_path = docs_dir.join(HOME_PAGE_FILENAME);
    let content = format!("# {}\n\n{}\n", site.home_title.trim(), site.home_body.trim());
    fs::write(&index_path, content).map_err(|e| DocsError::io(&index_path, e))?;
    info!(path = %index_path.display(), "Wrote home page");
    Ok(index_path)
}

/// Prefix every module name with the package directory name.
fn qualify_modules(modules: ApiIndex, package: &Path) -> ApiIndex {
    let Some(prefix) = package.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return modules;
    };
    modules
        .into_values()
        .map(|mut module| {
            module.module_name = format!("{prefix}.{}", module.module_name);
            (module.module_name.clone(), module)
        })
        .collect()
}

/// Document every package of `layout` into its API directory.
///
/// The per-package indexes are combined and rendered once. With more than
/// one package, module names are qualified by their package
/// (`alpha.cli`, `beta.cli`). With Markdown
/// among `formats`, the home page and site config are regenerated as well.
pub fn publish_api_docs(
    layout: &ProjectLayout,
    extractor: &dyn ApiExtractor,
    formats: &[OutputFormat],
) -> Result<ApiIndex, DocsError> {
    if layout.packages.is_empty() {
        error!(root = %layout.project_root.display(), "No packages detected");
        return Err(DocsError::NoPackages);
    }

    let qualify = layout.packages.len() > 1;
    let mut index = ApiIndex::new();
    for package in &layout.packages {
        info!(package = %package.display(), strategy = extractor.strategy(), "Extracting package");
        let mut modules = extract_module_api(package, extractor);
        if qualify {
            modules = qualify_modules(modules, package);
        }
        for (name, module) in modules {
            if index.insert(name.clone(), module).is_some() {
                warn!(module = %name, package = %package.display(), "Module documented twice, keeping the later one");
            }
        }
    }
    if index.is_empty() {
        let src = layout
            .src_dir
            .clone()
            .unwrap_or_else(|| layout.project_root.clone());
        error!(src = %src.display(), "No public API found");
        return Err(DocsError::NoPublicApi(src));
    }

    let api_dir = &layout.docs_api_dir;
    fs::create_dir_all(api_dir).map_err(|e| DocsError::io(api_dir, e))?;
    write_formats(&index, api_dir, formats)?;

    if formats.contains(&OutputFormat::Markdown) {
        let docs = &layout.policy.docs;
        write_index_md(&layout.docs_dir, &docs.site)?;
        generate_site_config(
            &layout.project_name(),
            &layout.project_root,
            api_dir,
            &layout.docs_dir,
            docs,
        )?;
    } else {
        info!("Markdown not requested, site config left unchanged");
    }

    info!(modules = index.len(), api_dir = %api_dir.display(), "API documentation published");
    Ok(index)
}
