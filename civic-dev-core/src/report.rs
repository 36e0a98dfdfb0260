//! Timestamped JSON reports written by data agents, and the readers,
//! summaries and index built over a reports tree.
//!
//! Layout: `<reports>/<agent>/<YYYY-MM-DD>.json`, one file per agent per
//! UTC day. A later run on the same day replaces that day's report.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ReportError;
use crate::layout::safe_filename;
use crate::site::title_case;

pub const REPORTS_DIR: &str = "reports";
pub const REPORT_INDEX_FILENAME: &str = "index.md";
pub const REPORT_EXTENSION: &str = "json";
pub const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

/// Top-level keys every report must carry.
pub const EXPECTED_REPORT_KEYS: [&str; 7] = [
    "agent",
    "timestamp",
    "record_count",
    "agent_version",
    "schema_version",
    "lib_version",
    "results",
];

const AGENT_DIR_MAX_LEN: usize = 100;

/// On-disk report document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: String,
    pub timestamp: String,
    pub record_count: usize,
    pub agent_version: String,
    pub schema_version: String,
    pub lib_version: String,
    pub results: Vec<Value>,
}

/// Metadata stamped on every report an agent writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMeta {
    pub agent: String,
    pub agent_version: String,
    pub schema_version: String,
    pub lib_version: String,
}

impl ReportMeta {
    pub fn new(
        agent: impl Into<String>,
        agent_version: impl Into<String>,
        lib_version: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            agent_version: agent_version.into(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            lib_version: lib_version.into(),
        }
    }
}

/// Write today's report for `meta.agent` under `report_dir`.
pub fn write_report(
    results: Vec<Value>,
    meta: &ReportMeta,
    report_dir: &Path,
) -> Result<PathBuf, ReportError> {
    write_report_at(results, meta, report_dir, Utc::now())
}

/// [`write_report`] with an explicit clock.
pub fn write_report_at(
    results: Vec<Value>,
    meta: &ReportMeta,
    report_dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf, ReportError> {
    let agent_dir = report_dir.join(safe_filename(&meta.agent, AGENT_DIR_MAX_LEN));
    fs::create_dir_all(&agent_dir).map_err(|e| ReportError::io(&agent_dir, e))?;
    let path = agent_dir.join(format!(
        "{}.{REPORT_EXTENSION}",
        now.format(DATE_ONLY_FORMAT)
    ));

    let report = AgentReport {
        agent: meta.agent.clone(),
        timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        record_count: results.len(),
        agent_version: meta.agent_version.clone(),
        schema_version: meta.schema_version.clone(),
        lib_version: meta.lib_version.clone(),
        results,
    };
    let body = serde_json::to_string_pretty(&report).map_err(|source| ReportError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, body).map_err(|e| ReportError::io(&path, e))?;
    info!(path = %path.display(), records = report.record_count, "Report written");
    Ok(path)
}

/// A `.json` file whose name starts with a `YYYY-MM-DD` date.
pub fn is_report_file(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some(REPORT_EXTENSION) {
        return false;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.get(..10))
        .is_some_and(|d| NaiveDate::parse_from_str(d, DATE_ONLY_FORMAT).is_ok())
}

/// Display name of the agent owning `report`: its folder, title-cased.
pub fn agent_name_from_path(report: &Path) -> String {
    report
        .parent()
        .and_then(Path::file_name)
        .map(|n| title_case(&n.to_string_lossy().replace('_', " ")))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown Agent".to_string())
}

/// Most recent report file in `agent_dir`, by date-prefixed name.
pub fn latest_report(agent_dir: &Path) -> Option<PathBuf> {
    let latest = fs::read_dir(agent_dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_report_file(p))
        .max_by(|a, b| a.file_name().cmp(&b.file_name()));

    match &latest {
        Some(path) => debug!(agent_dir = %agent_dir.display(), latest = %path.display(), "Latest report"),
        None => warn!(agent_dir = %agent_dir.display(), "No reports found"),
    }
    latest
}

/// Expected keys absent from a parsed report.
pub fn missing_report_keys(report: &Value) -> Vec<String> {
    EXPECTED_REPORT_KEYS
        .iter()
        .filter(|k| report.get(**k).is_none())
        .map(|k| k.to_string())
        .collect()
}

/// Read and validate the latest report in `agent_dir`.
pub fn read_latest_report(agent_dir: &Path) -> Result<AgentReport, ReportError> {
    let path =
        latest_report(agent_dir).ok_or_else(|| ReportError::NotFound(agent_dir.to_path_buf()))?;
    let body = fs::read_to_string(&path).map_err(|e| ReportError::io(&path, e))?;
    let value: Value = serde_json::from_str(&body).map_err(|source| ReportError::Json {
        path: path.clone(),
        source,
    })?;

    let missing = missing_report_keys(&value);
    if !missing.is_empty() {
        warn!(path = %path.display(), ?missing, "Report missing expected keys");
        return Err(ReportError::Invalid { path, missing });
    }
    serde_json::from_value(value).map_err(|source| ReportError::Json { path, source })
}

/// Markdown page with a report's metadata.
pub fn render_summary(report: &AgentReport) -> String {
    [
        format!("# Report Summary for {}", report.agent),
        format!("**Date:** {}", report.timestamp),
        format!("**Agent Version:** {}", report.agent_version),
        format!("**Library Version:** {}", report.lib_version),
        format!("**Record Count:** {}", report.record_count),
        String::new(),
        "Auto-generated summary. Data is available in the JSON report.".to_string(),
    ]
    .join("\n")
}

pub fn write_markdown_summary(report: &AgentReport, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }
    fs::write(path, render_summary(report)).map_err(|e| ReportError::io(path, e))?;
    info!(path = %path.display(), "Markdown summary written");
    Ok(())
}

/// Rewrite `<report_dir>/index.md` with a link to each agent's latest report.
pub fn generate_index(report_dir: &Path) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(report_dir).map_err(|e| ReportError::io(report_dir, e))?;
    let index_path = report_dir.join(REPORT_INDEX_FILENAME);

    let mut agent_dirs: Vec<PathBuf> = fs::read_dir(report_dir)
        .map_err(|e| ReportError::io(report_dir, e))?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    agent_dirs.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    let mut lines = vec!["# Civic Interconnect Agent Reports".to_string(), String::new()];
    for agent_dir in &agent_dirs {
        let Some(latest) = latest_report(agent_dir) else {
            continue;
        };
        let Ok(rel) = latest.strip_prefix(report_dir) else {
            continue;
        };
        let link = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        lines.push(format!(
            "- **{}**: [Latest Report]({link})",
            agent_name_from_path(&latest)
        ));
    }
    let agents = lines.len() - 2;
    if agents == 0 {
        warn!(report_dir = %report_dir.display(), "No agent reports found, index is empty");
        lines.push("_No reports found._".to_string());
    }

    fs::write(&index_path, lines.join("\n") + "\n")
        .map_err(|e| ReportError::io(&index_path, e))?;
    info!(path = %index_path.display(), agents, "Report index written");
    Ok(index_path)
}

/// The `days_back` dates ending with `today`, earliest first.
pub fn date_range(days_back: u32, today: NaiveDate) -> Vec<String> {
    (0..i64::from(days_back))
        .rev()
        .map(|ago| (today - Duration::days(ago)).format(DATE_ONLY_FORMAT).to_string())
        .collect()
}

pub fn today_utc_str() -> String {
    Utc::now().format(DATE_ONLY_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 6, 30, 0).unwrap()
    }

    #[test]
    fn report_carries_metadata_and_dated_name() {
        let dir = tempdir().unwrap();
        let meta = ReportMeta::new("Bills Agent", "0.2.0", "1.4.0");
        let path = write_report_at(
            vec![json!({"id": 1}), json!({"id": 2})],
            &meta,
            dir.path(),
            at(2025, 3, 9),
        )
        .unwrap();

        assert_eq!(path, dir.path().join("bills_agent/2025-03-09.json"));
        let report: AgentReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report.agent, "Bills Agent");
        assert_eq!(report.timestamp, "2025-03-09 06:30:00 UTC");
        assert_eq!(report.record_count, 2);
        assert_eq!(report.schema_version, DEFAULT_SCHEMA_VERSION);
        assert_eq!(report.lib_version, "1.4.0");
    }

    #[test]
    fn latest_report_is_read_back() {
        let dir = tempdir().unwrap();
        let meta = ReportMeta::new("votes", "1.0.0", "1.0.0");
        write_report_at(vec![json!(1)], &meta, dir.path(), at(2025, 1, 2)).unwrap();
        write_report_at(vec![json!(1), json!(2)], &meta, dir.path(), at(2025, 1, 10)).unwrap();
        write(dir.path().join("votes/notes.json"), "{}").unwrap();

        let report = read_latest_report(&dir.path().join("votes")).unwrap();
        assert_eq!(report.timestamp, "2025-01-10 06:30:00 UTC");
        assert_eq!(report.record_count, 2);
    }

    #[test]
    fn incomplete_report_is_rejected() {
        let dir = tempdir().unwrap();
        let agent = dir.path().join("votes");
        create_dir_all(&agent).unwrap();
        write(agent.join("2025-01-01.json"), r#"{"agent": "votes", "results": []}"#).unwrap();

        match read_latest_report(&agent).unwrap_err() {
            ReportError::Invalid { missing, .. } => {
                assert!(missing.contains(&"timestamp".to_string()));
                assert!(!missing.contains(&"agent".to_string()));
            }
            other => panic!("expected invalid report, got {other:?}"),
        }
    }

    #[test]
    fn agent_without_reports_is_not_found() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_latest_report(dir.path()),
            Err(ReportError::NotFound(_))
        ));
    }

    #[test]
    fn report_files_need_a_date_prefix() {
        assert!(is_report_file(Path::new("a/2024-07-01.json")));
        assert!(is_report_file(Path::new("a/2024-07-01-rerun.json")));
        assert!(!is_report_file(Path::new("a/latest.json")));
        assert!(!is_report_file(Path::new("a/2024-07-01.csv")));
    }

    #[test]
    fn summary_lists_report_metadata() {
        let report = AgentReport {
            agent: "bills".into(),
            timestamp: "2025-03-09 06:30:00 UTC".into(),
            record_count: 12,
            agent_version: "0.2.0".into(),
            schema_version: "1.0.0".into(),
            lib_version: "1.4.0".into(),
            results: vec![],
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries/bills.md");
        write_markdown_summary(&report, &path).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.starts_with("# Report Summary for bills\n**Date:** 2025-03-09"));
        assert!(text.contains("**Record Count:** 12"));
    }

    #[test]
    fn index_links_latest_report_per_agent() {
        let dir = tempdir().unwrap();
        write_report_at(vec![], &ReportMeta::new("votes_agent", "1", "1"), dir.path(), at(2025, 2, 1))
            .unwrap();
        write_report_at(vec![], &ReportMeta::new("bills", "1", "1"), dir.path(), at(2025, 2, 3))
            .unwrap();
        create_dir_all(dir.path().join("empty")).unwrap();

        let index = generate_index(dir.path()).unwrap();
        assert_eq!(
            fs::read_to_string(index).unwrap(),
            "# Civic Interconnect Agent Reports\n\n\
             - **Bills**: [Latest Report](bills/2025-02-03.json)\n\
             - **Votes Agent**: [Latest Report](votes_agent/2025-02-01.json)\n"
        );
    }

    #[test]
    fn index_without_reports_says_so() {
        let dir = tempdir().unwrap();
        let index = generate_index(&dir.path().join(REPORTS_DIR)).unwrap();
        assert!(fs::read_to_string(index)
            .unwrap()
            .ends_with("_No reports found._\n"));
    }

    #[test]
    fn date_range_ends_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(date_range(3, today), vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
        assert!(date_range(0, today).is_empty());
        assert_eq!(today_utc_str().len(), 10);
    }
}
