//! Static extraction of a Python package's public API.
//!
//! Source files are parsed with tree-sitter and never executed. Only
//! module-level `def`, `async def` and `class` statements are considered
//! (decorated ones included); methods and nested functions belong to their
//! enclosing scope and are not module symbols.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tree_sitter::{Language, Node, Parser, Tree};
use walkdir::WalkDir;

use crate::contract::{
    docstring_or_placeholder, is_public, ApiExtractor, ApiIndex, ClassInfo, FunctionInfo,
    ModuleApiInfo, PublicNames,
};
use crate::error::ExtractError;

/// Thin wrapper around a tree-sitter parser configured for Python.
pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self, ExtractError> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ExtractError::Parser(e.to_string()))?;
        Ok(Self { parser })
    }

    pub fn parse(&mut self, source: &str) -> Result<Tree, ExtractError> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::Parser("parser returned no tree".to_string()))
    }
}

/// Default strategy: syntax-tree walk, no code execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticExtractor;

impl ApiExtractor for StaticExtractor {
    fn strategy(&self) -> &'static str {
        "static"
    }

    fn extract_module(
        &self,
        path: &Path,
        module_name: &str,
    ) -> Result<ModuleApiInfo, ExtractError> {
        let source = fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        extract_source(&source, module_name).map_err(|e| match e {
            ExtractError::Syntax { line, .. } => ExtractError::Syntax {
                path: path.to_path_buf(),
                line,
            },
            other => other,
        })
    }
}

/// Extract the public API from Python source text.
pub fn extract_source(source: &str, module_name: &str) -> Result<ModuleApiInfo, ExtractError> {
    let mut parser = PythonParser::new()?;
    let tree = parser.parse(source)?;
    let root = tree.root_node();

    if root.has_error() {
        return Err(ExtractError::Syntax {
            path: PathBuf::from(module_name),
            line: first_error_line(root),
        });
    }

    let public_names = extract_public_names(root, source);

    // Keyed by name: a later definition rebinds the name, as Python does.
    let mut functions: BTreeMap<String, FunctionInfo> = BTreeMap::new();
    let mut classes: BTreeMap<String, ClassInfo> = BTreeMap::new();

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let Some(def) = unwrap_definition(child) else {
            continue;
        };
        match def.kind() {
            "function_definition" => {
                if let Some(func) = function_info(def, source) {
                    classes.remove(&func.name);
                    functions.insert(func.name.clone(), func);
                }
            }
            "class_definition" => {
                if let Some(class) = class_info(def, source) {
                    functions.remove(&class.name);
                    classes.insert(class.name.clone(), class);
                }
            }
            _ => {}
        }
    }

    Ok(ModuleApiInfo {
        module_name: module_name.to_string(),
        functions: functions
            .into_values()
            .filter(|f| is_public(&f.name, &public_names))
            .collect(),
        classes: classes
            .into_values()
            .filter(|c| is_public(&c.name, &public_names))
            .collect(),
    })
}

/// Walk `package_path` for `.py` files and extract each one.
///
/// Files whose name starts with `_` (including `__init__.py`) are skipped.
/// Failures are logged and the module left out; so are modules without any
/// public symbol.
pub fn extract_module_api(package_path: &Path, extractor: &dyn ApiExtractor) -> ApiIndex {
    let mut api = ApiIndex::new();

    for entry in WalkDir::new(package_path).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, package = %package_path.display(), "Skipped unreadable path");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("py")
        {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if file_name.starts_with('_') {
            debug!(path = %path.display(), "Skipping private module");
            continue;
        }

        let Some(module_name) = module_name_for(package_path, path) else {
            continue;
        };
        info!(path = %path.display(), module = %module_name, strategy = extractor.strategy(), "Processing");

        match extractor.extract_module(path, &module_name) {
            Ok(module) if module.is_empty() => {
                debug!(module = %module_name, "No public symbols, omitted");
            }
            Ok(module) => {
                api.insert(module_name, module);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipped module");
            }
        }
    }

    api
}

/// Dotted module name of `file` relative to `package_root`.
pub fn module_name_for(package_root: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(package_root).ok()?.with_extension("");
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

fn unwrap_definition(node: Node) -> Option<Node> {
    match node.kind() {
        "function_definition" | "class_definition" => Some(node),
        "decorated_definition" => node.child_by_field_name("definition"),
        _ => None,
    }
}

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn first_error_line(node: Node) -> usize {
    if node.is_error() || node.is_missing() {
        return node.start_position().row + 1;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        if child.has_error() || child.is_missing() {
            return first_error_line(child);
        }
    }
    node.start_position().row + 1
}

/// Names listed in module-level `__all__` assignments.
pub fn extract_public_names(root: Node, source: &str) -> PublicNames {
    let mut names = PublicNames::new();
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let mut inner = stmt.walk();
        for expr in stmt.named_children(&mut inner) {
            if !matches!(expr.kind(), "assignment" | "augmented_assignment") {
                continue;
            }
            let is_all = expr
                .child_by_field_name("left")
                .is_some_and(|l| l.kind() == "identifier" && text(l, source) == "__all__");
            let Some(right) = expr.child_by_field_name("right") else {
                continue;
            };
            if !is_all || !matches!(right.kind(), "list" | "tuple") {
                continue;
            }
            let mut elts = right.walk();
            for elt in right.named_children(&mut elts) {
                if elt.kind() == "string" {
                    if let Some(name) = string_literal_value(text(elt, source)) {
                        names.insert(name);
                    }
                }
            }
        }
    }
    names
}

fn function_info(node: Node, source: &str) -> Option<FunctionInfo> {
    let name = text(node.child_by_field_name("name")?, source).to_string();
    let params = node
        .child_by_field_name("parameters")
        .map(|p| render_parameters(p, source))
        .unwrap_or_default();
    let docstring = docstring_or_placeholder(body_docstring(node, source));
    Some(FunctionInfo {
        signature: format!("{name}({})", params.join(", ")),
        name,
        docstring,
    })
}

fn class_info(node: Node, source: &str) -> Option<ClassInfo> {
    let name = text(node.child_by_field_name("name")?, source).to_string();
    let mut bases = Vec::new();
    if let Some(args) = node.child_by_field_name("superclasses") {
        let mut cursor = args.walk();
        for arg in args.named_children(&mut cursor) {
            if matches!(arg.kind(), "keyword_argument" | "comment") {
                continue;
            }
            bases.push(collapse_whitespace(text(arg, source)));
        }
    }
    let docstring = docstring_or_placeholder(body_docstring(node, source));
    Some(ClassInfo {
        signature: format!("{name}({})", bases.join(", ")),
        name,
        docstring,
    })
}

fn render_parameters(params: Node, source: &str) -> Vec<String> {
    let mut cursor = params.walk();
    params
        .named_children(&mut cursor)
        .filter_map(|p| render_parameter(p, source))
        .collect()
}

fn render_parameter(param: Node, source: &str) -> Option<String> {
    match param.kind() {
        "comment" => None,
        "keyword_separator" => Some("*".to_string()),
        "positional_separator" => Some("/".to_string()),
        // Annotation dropped, keep the (possibly splatted) name.
        "typed_parameter" => {
            let mut cursor = param.walk();
            let target = param
                .named_children(&mut cursor)
                .find(|c| c.kind() != "type" && c.kind() != "comment")?;
            Some(text(target, source).to_string())
        }
        "default_parameter" | "typed_default_parameter" => {
            let name = text(param.child_by_field_name("name")?, source);
            let value = collapse_whitespace(text(param.child_by_field_name("value")?, source));
            Some(format!("{name}={value}"))
        }
        _ => Some(text(param, source).to_string()),
    }
}

fn collapse_whitespace(s: &str) -> String {
    if s.contains('\n') {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        s.to_string()
    }
}

/// Docstring of a `def`/`class`: its first body statement, if a plain string.
fn body_docstring(def: Node, source: &str) -> Option<String> {
    let body = def.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let mut expr = first.named_child(0)?;
    while expr.kind() == "parenthesized_expression" {
        expr = expr.named_child(0)?;
    }
    let raw = match expr.kind() {
        "string" => string_literal_value(text(expr, source))?,
        "concatenated_string" => {
            let mut parts = expr.walk();
            let pieces = expr
                .named_children(&mut parts)
                .filter(|n| n.kind() == "string")
                .map(|n| string_literal_value(text(n, source)))
                .collect::<Option<Vec<String>>>()?;
            pieces.concat()
        }
        _ => return None,
    };
    Some(clean_docstring(&raw))
}

/// Value of a Python string literal: quotes removed, escapes resolved unless
/// raw. f-strings and bytes yield `None`.
pub fn string_literal_value(literal: &str) -> Option<String> {
    let quote_start = literal.find(['"', '\''])?;
    let prefix = literal[..quote_start].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') {
        return None;
    }
    let body = &literal[quote_start..];
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            let inner = &body[quote.len()..body.len() - quote.len()];
            return Some(if prefix.contains('r') {
                inner.to_string()
            } else {
                unescape(inner)
            });
        }
    }
    None
}

/// Resolve backslash escapes of a non-raw literal. Unknown escapes and
/// `\N{...}` are kept verbatim, as Python keeps unknown ones.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(next),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            '0'..='7' => {
                let mut digits = String::from(next);
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                let decoded = Some(&digits)
                    .filter(|d| d.len() == width && d.chars().all(|h| h.is_ascii_hexdigit()))
                    .and_then(|d| u32::from_str_radix(d, 16).ok())
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

/// Normalize docstring indentation: the first line is stripped, the common
/// indentation of the remaining lines removed, and blank edge lines dropped.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    // Margins are counted in chars; indentation may be any Unicode space.
    let margin = lines[1..]
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim().to_string());
    for line in &lines[1..] {
        let stripped = match line.char_indices().nth(margin) {
            Some((at, _)) => &line[at..],
            None => "",
        };
        cleaned.push(stripped.trim_end().to_string());
    }

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
