//! Error types shared across the core crate.
//!
//! Per-module extraction failures ([`ExtractError`]) are always recovered by the
//! package walk; everything else bubbles up to the CLI, which turns it into a
//! nonzero exit.

use std::path::PathBuf;

/// Missing or malformed configuration input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable absent or blank.
    #[error("Missing API key for {service}. Fix: add '{var}' to your .env file or system environment.")]
    MissingEnv { var: String, service: String },

    /// Config or policy file not found.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Config or policy file is not valid YAML for the expected shape.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Built-in defaults could not be parsed.
    #[error("Invalid built-in policy defaults: {0}")]
    Defaults(#[source] serde_yaml::Error),

    /// Logging could not be set up.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to extract one module. Never fatal to a documentation run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("syntax error in {path} near line {line}")]
    Syntax { path: PathBuf, line: usize },

    #[error("{path} raised on import: {stderr}")]
    Import { path: PathBuf, stderr: String },

    #[error("could not reflect over {path}: {reason}")]
    Reflection { path: PathBuf, reason: String },

    #[error("parser setup failed: {0}")]
    Parser(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Documentation generation failure.
#[derive(Debug, thiserror::Error)]
pub enum DocsError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Extraction produced nothing for the package.
    #[error("No public API found in {0}")]
    NoPublicApi(PathBuf),

    /// Navigation requested over a directory without rendered pages.
    #[error("No markdown files found in {0}. Navigation would be empty.")]
    NoMarkdown(PathBuf),

    #[error("No packages detected under the source directory. Nothing to document.")]
    NoPackages,

    #[error("Unsupported output format: {0}. Use yaml or markdown")]
    UnsupportedFormat(String),
}

impl DocsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Transport-level failure talking to a GraphQL endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Endpoint answered with a non-success HTTP status.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Endpoint answered with GraphQL `errors`.
    #[error("GraphQL query error: {0}")]
    Query(String),

    /// Response was not a well-formed GraphQL payload.
    #[error("transport protocol error: {0}")]
    Protocol(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl TransportError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, TransportError::Server { status: 403, .. })
    }
}

/// Failure of a whole paginated fetch. Partial results are never returned.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("response has no value at '{0}'")]
    MissingPath(String),

    #[error("value at '{0}' is not a list of records")]
    NotAList(String),

    #[error("Could not infer page_info path. Please specify page_info_path.")]
    PageInfoNotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Project root not found. Searched from '{start}' upward for markers: {markers}.")]
    RootNotFound { start: PathBuf, markers: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    Invalid(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Agent report reading and writing.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("No report found in {0}")]
    NotFound(PathBuf),

    #[error("Invalid report JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid report format in {path}: missing {}", missing.join(", "))]
    Invalid { path: PathBuf, missing: Vec<String> },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.into(),
            source,
        }
    }
}
