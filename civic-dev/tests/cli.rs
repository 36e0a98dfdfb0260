use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, create_dir_all, write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn civic_dev() -> Command {
    Command::cargo_bin("civic-dev").expect("Binary exists")
}

fn write_project(root: &Path) {
    create_dir_all(root.join("src/civic_demo")).unwrap();
    write(
        root.join("pyproject.toml"),
        "[project]\nname = \"civic-demo\"\nversion = \"0.3.1\"\n",
    )
    .unwrap();
    write(root.join("VERSION"), "0.3.1\n").unwrap();
    write(root.join("src/civic_demo/__init__.py"), "").unwrap();
    write(
        root.join("src/civic_demo/bills.py"),
        "def fetch_bills(state, limit=100):\n    \"\"\"Fetch bills for a state.\"\"\"\n\n\nclass BillClient:\n    pass\n",
    )
    .unwrap();
}

#[test]
fn check_version_same_major_succeeds() {
    civic_dev()
        .args(["check-version", "1.2.3", "1.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Versions compatible"));
}

#[test]
fn check_version_major_mismatch_fails() {
    civic_dev()
        .args(["check-version", "2.0.0", "1.9.9"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Version mismatch"));
}

#[test]
fn check_version_strict_requires_exact_match() {
    civic_dev()
        .args(["check-version", "1.2.3", "1.2.4", "--strict"])
        .assert()
        .code(1);
}

#[test]
fn bump_version_updates_files_then_reports_nothing_to_do() {
    let dir = tempdir().unwrap();
    write_project(dir.path());

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .args(["bump-version", "0.3.1", "0.4.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 file(s) updated."));
    assert_eq!(
        fs::read_to_string(dir.path().join("VERSION")).unwrap(),
        "0.4.0\n"
    );

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .args(["bump", "0.3.1", "0.4.0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No files were updated."));
}

#[test]
fn layout_prints_the_discovered_project() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    create_dir_all(dir.path().join("docs/api")).unwrap();

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .arg("layout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Packages:"))
        .stdout(predicate::str::contains("src/civic_demo"))
        .stdout(predicate::str::contains("Layout verified successfully."));
}

#[test]
fn build_api_writes_docs_and_site_config() {
    let dir = tempdir().unwrap();
    write_project(dir.path());

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .arg("build-api")
        .assert()
        .success()
        .stdout(predicate::str::contains("Documented 1 module(s)"));

    let page = fs::read_to_string(dir.path().join("docs/api/bills.md")).unwrap();
    assert!(page.contains("### `fetch_bills(state, limit=100)`"));
    assert!(page.contains("### `BillClient()`"));
    assert!(dir.path().join("docs/api/API.yaml").exists());
    assert!(dir.path().join("docs/index.md").exists());
    let config = fs::read_to_string(dir.path().join("mkdocs.yml")).unwrap();
    assert!(config.contains("- Bills: api/bills.md"));
}

#[test]
fn build_api_rejects_unknown_format() {
    let dir = tempdir().unwrap();
    write_project(dir.path());

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .args(["build-api", "--format", "html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported output format: html"));
    assert!(!dir.path().join("mkdocs.yml").exists());
}

#[test]
fn check_policy_lists_missing_files() {
    let dir = tempdir().unwrap();
    write_project(dir.path());

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .args(["check-policy", "--repo-type", "python"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Missing required file: README.md"))
        .stdout(predicate::str::contains("Missing Python project directory: tests/"));
}

#[test]
fn fetch_without_api_key_fails_with_the_variable_name() {
    let dir = tempdir().unwrap();
    let query = dir.path().join("bills.graphql");
    write(&query, "query($first: Int, $after: String) { bills { edges { node { id } } } }").unwrap();

    civic_dev()
        .args(["fetch", "--url", "http://127.0.0.1:9/graphql"])
        .args(["--api-key-env", "CIVIC_DEV_CLI_TEST_MISSING_KEY"])
        .arg("--query-file")
        .arg(&query)
        .args(["--data-path", "bills.edges"])
        .env_remove("CIVIC_DEV_CLI_TEST_MISSING_KEY")
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CIVIC_DEV_CLI_TEST_MISSING_KEY"));
}

#[test]
fn report_index_links_each_agent() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    let agent = dir.path().join("reports/bills_agent");
    create_dir_all(&agent).unwrap();
    write(agent.join("2025-02-01.json"), "{}").unwrap();
    write(agent.join("2025-02-03.json"), "{}").unwrap();

    civic_dev()
        .arg("--root")
        .arg(dir.path())
        .arg("report-index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Report index written"));

    let index = fs::read_to_string(dir.path().join("reports/index.md")).unwrap();
    assert!(index.contains("- **Bills Agent**: [Latest Report](bills_agent/2025-02-03.json)"));
}

use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use civic_dev::cli::{run, Cli, Commands};

    let cli = Cli {
        root: None,
        log_level: None,
        command: Commands::CheckVersion {
            agent: "1.2.3".to_string(),
            lib: "1.0.0".to_string(),
            strict: false,
        },
    };

    let code = run(cli).await.unwrap();
    assert_eq!(code, 0);

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
