//! Reflective extraction: import the module in a Python interpreter and
//! inspect the live objects.
//!
//! This executes project code, so a module that raises on import fails here
//! where the static strategy would not. That failure is returned as
//! [`ExtractError::Import`] and the package walk skips the module.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::contract::{
    docstring_or_placeholder, is_public, ApiExtractor, ClassInfo, FunctionInfo, ModuleApiInfo,
    PublicNames,
};
use crate::error::ExtractError;

/// Inspection script run as `python -c SCRIPT <file> <module_name>`.
/// Prints one JSON object on stdout.
const INSPECT_SCRIPT: &str = r#"
import importlib.util, inspect, json, sys

path, name = sys.argv[1], sys.argv[2]
spec = importlib.util.spec_from_file_location(name, path)
if spec is None or spec.loader is None:
    raise ImportError(f"Cannot load {name} from {path}")
module = importlib.util.module_from_spec(spec)
sys.modules[name] = module
spec.loader.exec_module(module)

def docstring(obj):
    doc = obj.__doc__ if isinstance(obj.__doc__, str) else None
    return inspect.cleandoc(doc) if doc else None

def parameters(func):
    try:
        sig = inspect.signature(func)
    except (TypeError, ValueError):
        return "()"
    bare = [p.replace(annotation=inspect.Parameter.empty) for p in sig.parameters.values()]
    return str(sig.replace(parameters=bare, return_annotation=inspect.Signature.empty))

out = {"all": [n for n in getattr(module, "__all__", []) if isinstance(n, str)],
       "functions": [], "classes": []}
for attr, member in vars(module).items():
    if getattr(member, "__module__", None) != name:
        continue
    if inspect.isfunction(member):
        out["functions"].append({"name": attr, "signature": parameters(member),
                                 "docstring": docstring(member)})
    elif inspect.isclass(member):
        bases = [b.__name__ for b in member.__bases__ if b is not object]
        out["classes"].append({"name": attr, "bases": bases, "docstring": docstring(member)})
json.dump(out, sys.stdout)
"#;

#[derive(Debug, Deserialize)]
struct Reflected {
    #[serde(default)]
    all: Vec<String>,
    #[serde(default)]
    functions: Vec<ReflectedMember>,
    #[serde(default)]
    classes: Vec<ReflectedMember>,
}

/// A reflected function carries its parameter list, a class its base names.
#[derive(Debug, Deserialize)]
struct ReflectedMember {
    name: String,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    bases: Vec<String>,
    docstring: Option<String>,
}

/// Dynamic strategy backed by an external interpreter.
#[derive(Debug, Clone)]
pub struct ReflectExtractor {
    python: String,
}

impl ReflectExtractor {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for ReflectExtractor {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl ApiExtractor for ReflectExtractor {
    fn strategy(&self) -> &'static str {
        "reflect"
    }

    fn extract_module(
        &self,
        path: &Path,
        module_name: &str,
    ) -> Result<ModuleApiInfo, ExtractError> {
        debug!(python = %self.python, path = %path.display(), "Importing module for reflection");
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(INSPECT_SCRIPT)
            .arg(path)
            .arg(module_name)
            .output()
            .map_err(|e| ExtractError::Reflection {
                path: path.to_path_buf(),
                reason: format!("failed to launch {}: {e}", self.python),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Import {
                path: path.to_path_buf(),
                stderr: stderr.lines().last().unwrap_or_default().to_string(),
            });
        }

        let reflected: Reflected =
            serde_json::from_slice(&output.stdout).map_err(|e| ExtractError::Reflection {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(into_module_info(module_name, reflected))
    }
}

fn into_module_info(module_name: &str, reflected: Reflected) -> ModuleApiInfo {
    let public_names: PublicNames = reflected.all.into_iter().collect();

    let mut functions: Vec<FunctionInfo> = reflected
        .functions
        .into_iter()
        .filter(|m| is_public(&m.name, &public_names))
        .map(|m| FunctionInfo {
            signature: format!("{}{}", m.name, m.signature),
            docstring: docstring_or_placeholder(m.docstring),
            name: m.name,
        })
        .collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));

    let mut classes: Vec<ClassInfo> = reflected
        .classes
        .into_iter()
        .filter(|m| is_public(&m.name, &public_names))
        .map(|m| ClassInfo {
            signature: format!("{}({})", m.name, m.bases.join(", ")),
            docstring: docstring_or_placeholder(m.docstring),
            name: m.name,
        })
        .collect();
    classes.sort_by(|a, b| a.name.cmp(&b.name));

    ModuleApiInfo {
        module_name: module_name.to_string(),
        functions,
        classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MISSING_DOCSTRING;
    use crate::extract::StaticExtractor;

    #[test]
    fn reflected_members_get_the_same_rules_as_static_ones() {
        let payload = r#"{
            "all": ["_kept"],
            "functions": [
                {"name": "zeta", "signature": "(a, b=2)", "docstring": "Z."},
                {"name": "_hidden", "signature": "()", "docstring": null},
                {"name": "_kept", "signature": "()", "docstring": null},
                {"name": "alpha", "signature": "()", "docstring": ""}
            ],
            "classes": [
                {"name": "Thing", "bases": ["Base", "Mixin"], "docstring": "T."},
                {"name": "Plain", "bases": [], "docstring": null}
            ]
        }"#;
        let reflected: Reflected = serde_json::from_str(payload).unwrap();
        let module = into_module_info("pkg.mod", reflected);

        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["_kept", "alpha", "zeta"]);
        assert_eq!(module.functions[2].signature, "zeta(a, b=2)");
        assert_eq!(module.functions[1].docstring, MISSING_DOCSTRING);
        assert_eq!(module.classes[0].signature, "Plain()");
        assert_eq!(module.classes[1].signature, "Thing(Base, Mixin)");
    }

    fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn both_strategies_describe_a_module_alike() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widgets.py");
        std::fs::write(
            &path,
            r#""""Widgets."""


class Base:
    pass


class Widget(Base):
    """A widget."""

    def __init__(self, size: int = 3):
        self.size = size


def run(x: int = 1, *args, flag: bool = False, **kwargs) -> None:
    """Run it."""
"#,
        )
        .unwrap();

        let reflected = ReflectExtractor::default()
            .extract_module(&path, "widgets")
            .unwrap();
        let parsed = StaticExtractor.extract_module(&path, "widgets").unwrap();
        assert_eq!(reflected, parsed);
        assert_eq!(parsed.classes[1].signature, "Widget(Base)");
        assert_eq!(parsed.functions[0].signature, "run(x=1, *args, flag=False, **kwargs)");
    }

    #[test]
    fn missing_interpreter_is_a_reflection_error() {
        let extractor = ReflectExtractor::new("definitely-not-a-python-binary");
        let err = extractor
            .extract_module(Path::new("mod.py"), "mod")
            .unwrap_err();
        assert!(matches!(err, ExtractError::Reflection { .. }));
    }
}
