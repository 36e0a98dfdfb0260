//! # contract: shared data model and the two pluggable seams
//!
//! This module defines the data extracted from a Python package
//! ([`ModuleApiInfo`], [`FunctionInfo`], [`ClassInfo`]) and the traits the rest
//! of the crate is written against:
//!
//! - [`ApiExtractor`]: turns one source file into a [`ModuleApiInfo`]. The
//!   static tree-sitter strategy and the reflective interpreter strategy both
//!   implement it, so the package walk does not care which one is used.
//! - [`QueryTransport`]: sends one GraphQL request and returns its `data`
//!   object. The HTTP client implements it; tests use the generated
//!   `MockQueryTransport`.
//!
//! ## Mocking & Testing
//! - `QueryTransport` is annotated for `mockall` so pagination can be tested
//!   without a network.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, TransportError};

/// Substituted for any symbol that has no docstring.
pub const MISSING_DOCSTRING: &str = "No description available.";

/// A public module-level function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    /// e.g. `fetch(url, limit=100, *args, **kwargs)`
    pub signature: String,
    pub docstring: String,
}

/// A public module-level class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    /// Name plus parenthesized bases, `Name()` when there are none.
    pub signature: String,
    pub docstring: String,
}

/// Public surface of one module. Both lists are sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleApiInfo {
    pub module_name: String,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
}

impl ModuleApiInfo {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.classes.is_empty()
    }
}

/// Extraction result for a package, keyed by dotted module name.
pub type ApiIndex = BTreeMap<String, ModuleApiInfo>;

/// Names a module forces public through `__all__`.
pub type PublicNames = HashSet<String>;

/// A symbol is public when it has no leading underscore or is allowlisted.
pub fn is_public(name: &str, public_names: &PublicNames) -> bool {
    !name.starts_with('_') || public_names.contains(name)
}

/// Replace an absent or blank docstring with [`MISSING_DOCSTRING`].
pub fn docstring_or_placeholder(doc: Option<String>) -> String {
    match doc {
        Some(d) if !d.trim().is_empty() => d,
        _ => MISSING_DOCSTRING.to_string(),
    }
}

/// Strategy for reading the public API of a single Python source file.
pub trait ApiExtractor {
    /// Short label used in log events.
    fn strategy(&self) -> &'static str;

    /// Extract the public functions and classes of the file at `path`.
    ///
    /// Implementations apply the visibility rule, substitute placeholder
    /// docstrings and sort both lists. An empty result is not an error; the
    /// caller decides whether to keep it.
    fn extract_module(&self, path: &Path, module_name: &str)
        -> Result<ModuleApiInfo, ExtractError>;
}

/// One round trip against a GraphQL endpoint.
///
/// The implementor is responsible for transport, authentication and turning
/// GraphQL `errors` into [`TransportError::Query`]. It returns the `data`
/// object of the response.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscore_names_are_private_unless_allowlisted() {
        let mut allow = PublicNames::new();
        assert!(is_public("run", &allow));
        assert!(!is_public("_helper", &allow));
        allow.insert("_helper".to_string());
        assert!(is_public("_helper", &allow));
    }

    #[test]
    fn blank_docstrings_get_the_placeholder() {
        assert_eq!(docstring_or_placeholder(None), MISSING_DOCSTRING);
        assert_eq!(docstring_or_placeholder(Some("  \n".into())), MISSING_DOCSTRING);
        assert_eq!(docstring_or_placeholder(Some("Does it.".into())), "Does it.");
    }
}
