//! Process-wide tracing setup.
//!
//! `init_logging` installs the global subscriber at most once per process.
//! Events go to stderr and, when a log directory is given, to a daily file
//! under it that keeps the configured number of days.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::RuntimeConfig;
use crate::error::ConfigError;
use crate::policy::ProjectPolicy;

static ACTIVE_LEVEL: OnceLock<LevelFilter> = OnceLock::new();

const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub level: LevelFilter,
    /// Directory for the rotating file sink; `None` disables it.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    pub retention_days: usize,
    pub console: bool,
}

impl LoggingOptions {
    /// Options for a project checkout: logs land in `<root>/<log_subdir>`.
    pub fn for_project(root: &std::path::Path, policy: &ProjectPolicy, level: LevelFilter) -> Self {
        Self {
            level,
            log_dir: Some(root.join(&policy.log_subdir)),
            file_prefix: policy.log_file_prefix.clone(),
            retention_days: policy.log_retention_days,
            console: true,
        }
    }

    pub fn console_only(level: LevelFilter) -> Self {
        Self {
            level,
            log_dir: None,
            file_prefix: "civic-dev".to_string(),
            retention_days: 7,
            console: true,
        }
    }
}

/// Map a level name to a filter. Accepts `WARNING` and `CRITICAL` too.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(LevelFilter::TRACE),
        "DEBUG" => Some(LevelFilter::DEBUG),
        "INFO" => Some(LevelFilter::INFO),
        "WARN" | "WARNING" => Some(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Some(LevelFilter::ERROR),
        "OFF" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Effective level: explicit override, then runtime config, then policy,
/// then INFO. Unrecognized names fall through to the next source.
pub fn resolve_log_level(
    explicit: Option<&str>,
    runtime: &RuntimeConfig,
    policy: &ProjectPolicy,
) -> LevelFilter {
    [
        explicit,
        runtime.log_level.as_deref(),
        Some(policy.log_level.as_str()),
    ]
    .into_iter()
    .flatten()
    .find_map(parse_level)
    .unwrap_or(DEFAULT_LEVEL)
}

/// Install the global subscriber.
///
/// Returns `Ok(true)` when this call installed it and `Ok(false)` when
/// logging was already set up, in which case nothing changes.
pub fn init_logging(options: &LoggingOptions) -> Result<bool, ConfigError> {
    if ACTIVE_LEVEL.get().is_some() {
        return Ok(false);
    }

    let file_layer = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&options.file_prefix)
                .filename_suffix("log")
                .max_log_files(options.retention_days.max(1))
                .build(dir)
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender),
            )
        }
        None => None,
    };

    let console_layer = options
        .console
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let installed = tracing_subscriber::registry()
        .with(options.level)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if !installed {
        return Ok(false);
    }
    let _ = ACTIVE_LEVEL.set(options.level);
    info!(
        level = %options.level,
        log_dir = ?options.log_dir,
        "Logging initialised"
    );
    Ok(true)
}

/// Level of the subscriber installed by [`init_logging`], if any.
pub fn active_level() -> Option<LevelFilter> {
    ACTIVE_LEVEL.get().copied()
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS UTC`.
pub fn now_utc_str() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn log_agent_start(agent: &str) {
    info!(agent, "===== Starting {agent} =====");
}

pub fn log_agent_end(agent: &str, status: &str) {
    let finished_at = now_utc_str();
    if status.eq_ignore_ascii_case("success") {
        info!(agent, status, %finished_at, "===== {agent} completed =====");
    } else {
        warn!(agent, status, %finished_at, "===== {agent} finished with status {status} =====");
    }
}
