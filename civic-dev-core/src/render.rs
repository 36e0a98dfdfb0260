//! Rendering of an [`ApiIndex`] to Markdown pages and a YAML summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, error, info};

use crate::contract::{ApiExtractor, ApiIndex, ModuleApiInfo};
use crate::error::DocsError;
use crate::extract::extract_module_api;

/// File name of the function-name index written next to the pages.
pub const YAML_SUMMARY_FILENAME: &str = "API.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputFormat {
    Yaml,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = DocsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(DocsError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Page for one module: H1 heading, then Classes and Functions sections,
/// each omitted when empty.
pub fn render_module_markdown(module: &ModuleApiInfo) -> String {
    let mut out = format!("# Module `{}`\n\n", module.module_name);

    if !module.classes.is_empty() {
        out.push_str("## Classes\n\n");
        for cls in &module.classes {
            push_entry(&mut out, &cls.signature, &cls.docstring);
        }
    }

    if !module.functions.is_empty() {
        out.push_str("## Functions\n\n");
        for func in &module.functions {
            push_entry(&mut out, &func.signature, &func.docstring);
        }
    }

    out
}

fn push_entry(out: &mut String, signature: &str, docstring: &str) {
    out.push_str(&format!("### `{signature}`\n\n"));
    out.push_str(docstring);
    out.push_str("\n\n");
}

/// Write `<output_dir>/<module>.md` for every module in the index.
pub fn write_markdown_docs(index: &ApiIndex, output_dir: &Path) -> Result<(), DocsError> {
    for (module_name, module) in index {
        let md_path = output_dir.join(format!("{module_name}.md"));
        fs::write(&md_path, render_module_markdown(module))
            .map_err(|e| DocsError::io(&md_path, e))?;
        debug!(path = %md_path.display(), "Wrote markdown");
    }
    info!(output_dir = %output_dir.display(), modules = index.len(), "Markdown API docs written");
    Ok(())
}

/// Module name to public function names; modules without functions are
/// left out.
pub fn yaml_summary(index: &ApiIndex) -> BTreeMap<String, Vec<String>> {
    index
        .iter()
        .filter(|(_, m)| !m.functions.is_empty())
        .map(|(name, m)| {
            (
                name.clone(),
                m.functions.iter().map(|f| f.name.clone()).collect(),
            )
        })
        .collect()
}

/// Write `API.yaml`. An index without functions yields `{}`.
pub fn write_yaml_summary(index: &ApiIndex, output_dir: &Path) -> Result<(), DocsError> {
    let yaml_path = output_dir.join(YAML_SUMMARY_FILENAME);
    let body = serde_yaml::to_string(&yaml_summary(index))?;
    fs::write(&yaml_path, body).map_err(|e| DocsError::io(&yaml_path, e))?;
    info!(path = %yaml_path.display(), "YAML API summary written");
    Ok(())
}

/// Extract `package_dir` and write the requested formats into `output_dir`.
///
/// The YAML summary is always written before the Markdown pages. Fails with
/// [`DocsError::NoPublicApi`] when no module has a public symbol.
pub fn generate_docs(
    package_dir: &Path,
    output_dir: &Path,
    formats: &[OutputFormat],
    extractor: &dyn ApiExtractor,
) -> Result<ApiIndex, DocsError> {
    fs::create_dir_all(output_dir).map_err(|e| DocsError::io(output_dir, e))?;

    let index = extract_module_api(package_dir, extractor);
    if index.is_empty() {
        error!(package = %package_dir.display(), "No public API found");
        return Err(DocsError::NoPublicApi(package_dir.to_path_buf()));
    }

    write_formats(&index, output_dir, formats)?;
    Ok(index)
}

/// Write each requested format once, YAML first.
pub fn write_formats(
    index: &ApiIndex,
    output_dir: &Path,
    formats: &[OutputFormat],
) -> Result<(), DocsError> {
    let mut ordered = formats.to_vec();
    ordered.sort();
    ordered.dedup();
    for format in ordered {
        match format {
            OutputFormat::Yaml => write_yaml_summary(index, output_dir)?,
            OutputFormat::Markdown => write_markdown_docs(index, output_dir)?,
        }
    }
    Ok(())
}
