/// `workflow` module: the external-process sequences behind `install-deps`,
/// `prep-code` and `release`.
///
/// Every process goes through the [`CommandRunner`] trait so the sequences
/// can be tested against a mock. The system implementation refuses any
/// program outside a small allowlist and never goes through a shell.
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use civic_dev_core::config::{load_version, VERSION_FILENAME};
use civic_dev_core::version::repo_version;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use regex::Regex;
use tracing::{error, info, warn};

/// Programs the system runner may launch, besides the venv interpreter.
pub const ALLOWED_PROGRAMS: [&str; 6] = ["git", "ruff", "pre-commit", "pytest", "uv", "pip"];

/// Files whose modification makes an existing `.venv` stale.
pub const DEPENDENCY_FILES: [&str; 3] = ["pyproject.toml", "requirements.txt", "poetry.lock"];

pub const VENV_DIR: &str = ".venv";

const PRE_COMMIT_HOOKS_REPO: &str = "https://github.com/pre-commit/pre-commit-hooks";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+\.\d+\.\d+(?:[-+.][0-9A-Za-z.-]+)?$").unwrap());

/// One external process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: &[&str], cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: cwd.to_path_buf(),
        }
    }

    /// Whether this is `program` with exactly `args`.
    pub fn is(&self, program: &str, args: &[&str]) -> bool {
        self.program == program && self.args.iter().map(String::as_str).eq(args.iter().copied())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of a finished process. `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A workflow step whose process did not succeed.
#[derive(Debug, thiserror::Error)]
#[error("Command failed: {command} (exit code {code:?})")]
pub struct StepFailed {
    pub command: String,
    pub code: Option<i32>,
}

impl StepFailed {
    /// Process exit code to propagate: the child's code, else 1.
    pub fn exit_code(&self) -> i32 {
        self.code.filter(|c| *c != 0).unwrap_or(1)
    }
}

/// Launches external processes.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait CommandRunner {
    fn run(&self, invocation: Invocation) -> Result<CommandOutput>;
}

/// Runs processes on the host, restricted to [`ALLOWED_PROGRAMS`] and the
/// project's venv interpreter.
pub struct SystemRunner {
    venv_python: PathBuf,
}

impl SystemRunner {
    pub fn new(root: &Path) -> Self {
        Self {
            venv_python: venv_python(root),
        }
    }

    fn is_allowed(&self, program: &str) -> bool {
        ALLOWED_PROGRAMS.contains(&program) || Path::new(program) == self.venv_python
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: Invocation) -> Result<CommandOutput> {
        if !self.is_allowed(&invocation.program) {
            error!(program = %invocation.program, "Refusing to run program outside the allowlist");
            bail!("Program not allowed: {}", invocation.program);
        }
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .output()
            .with_context(|| format!("Failed to launch {}", invocation.program))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            info!(command = %invocation, stderr = %stderr.trim(), "Process stderr");
        }
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Run one step. With `check`, a nonzero exit is a [`StepFailed`] error.
pub fn step(
    runner: &dyn CommandRunner,
    root: &Path,
    program: &str,
    args: &[&str],
    check: bool,
) -> Result<CommandOutput> {
    let invocation = Invocation::new(program, args, root);
    let command = invocation.to_string();
    info!(command = %command, "$ {command}");
    let output = runner.run(invocation)?;
    if check && !output.success() {
        error!(command = %command, code = ?output.code, "Command failed");
        return Err(StepFailed {
            command,
            code: output.code,
        }
        .into());
    }
    Ok(output)
}

/// Interpreter inside `<root>/.venv`.
pub fn venv_python(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join(VENV_DIR).join("Scripts").join("python.exe")
    } else {
        root.join(VENV_DIR).join("bin").join("python")
    }
}

/// The venv interpreter, or an error when the venv is missing or broken.
pub fn verify_venv(root: &Path) -> Result<PathBuf> {
    let venv = root.join(VENV_DIR);
    if !venv.is_dir() {
        bail!("{} directory not found in {}", VENV_DIR, root.display());
    }
    let python = venv_python(root);
    if !python.exists() {
        bail!("Python not found in {}", python.display());
    }
    Ok(python)
}

/// True when the venv is missing or a dependency file is newer than it.
pub fn should_reinstall(root: &Path) -> bool {
    let venv_time = match root.join(VENV_DIR).metadata().and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return true,
    };
    DEPENDENCY_FILES.iter().any(|f| {
        root.join(f)
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|t| t > venv_time)
    })
}

/// Install tooling, the project with dev extras and the pre-commit hooks
/// into the existing venv.
pub fn install_deps(runner: &dyn CommandRunner, root: &Path, editable: bool) -> Result<()> {
    let python = verify_venv(root)?;
    let py = python.to_string_lossy().into_owned();

    step(
        runner,
        root,
        &py,
        &["-m", "pip", "install", "--upgrade", "pip", "setuptools", "wheel", "--prefer-binary"],
        true,
    )?;

    let mut install = vec!["-m", "pip", "install"];
    if editable {
        install.push("-e");
    }
    install.extend([".[dev]", "--timeout", "100", "--no-cache-dir", "--prefer-binary"]);
    step(runner, root, &py, &install, true)?;

    if root.join("requirements-dev.txt").exists() {
        step(
            runner,
            root,
            &py,
            &["-m", "pip", "install", "-r", "requirements-dev.txt", "--timeout", "100", "--no-cache-dir"],
            true,
        )?;
    }

    if let Err(e) = step(runner, root, &py, &["-m", "pre_commit", "install"], true) {
        warn!(error = %e, "Skipped pre-commit installation");
    }

    info!("Environment setup complete.");
    Ok(())
}

/// Format, lint, run the hooks twice and the tests.
pub fn prep_code(runner: &dyn CommandRunner, root: &Path) -> Result<()> {
    if should_reinstall(root) {
        error!("Virtual environment is missing or older than the dependency files");
        bail!("Virtual environment is stale. Run `civic-dev install-deps` first.");
    }
    info!(version = %repo_version(root), "Preparing code");

    step(runner, root, "ruff", &["format", "."], true)?;
    step(runner, root, "ruff", &["check", ".", "--fix"], true)?;
    step(runner, root, "pre-commit", &["run", "--all-files"], false)?;
    step(runner, root, "pre-commit", &["run", "--all-files"], true)?;
    step(runner, root, "pytest", &["tests"], true)?;

    info!("Code formatted, linted, and tested successfully.");
    Ok(())
}

/// Release tags look like `v1.2.3`, optionally with a suffix.
pub fn validate_tag(tag: &str) -> Result<()> {
    if !TAG_RE.is_match(tag) {
        bail!("Invalid release tag: {tag}");
    }
    Ok(())
}

/// Tag and push the version in `VERSION`. Returns the tag.
pub fn release(runner: &dyn CommandRunner, root: &Path) -> Result<String> {
    let version = load_version(root, VERSION_FILENAME)?;
    let tag = format!("v{}", version.trim_start_matches('v'));
    validate_tag(&tag)?;
    info!(%tag, "Releasing version {tag}...");

    step(runner, root, "pre-commit", &["autoupdate", "--repo", PRE_COMMIT_HOOKS_REPO], true)?;

    if root.join("pyproject.toml").exists() {
        let python = venv_python(root);
        if python.exists() {
            let py = python.to_string_lossy().into_owned();
            step(runner, root, &py, &["-m", "pip", "install", "-e", "."], true)?;
        } else {
            step(runner, root, "pip", &["install", "-e", "."], true)?;
        }
    } else {
        info!("pyproject.toml not found, skipping install.");
    }

    step(runner, root, "ruff", &["format", "."], true)?;
    step(runner, root, "ruff", &["check", ".", "--fix"], true)?;

    step(runner, root, "pre-commit", &["run", "--all-files"], false)?;
    step(runner, root, "git", &["add", "."], true)?;
    step(runner, root, "pre-commit", &["run", "--all-files"], false)?;
    step(runner, root, "git", &["add", "."], true)?;
    step(runner, root, "pre-commit", &["run", "--all-files"], true)?;

    if root.join("tests").exists() {
        step(runner, root, "pytest", &[], true)?;
    } else {
        info!("No tests/ folder, skipping tests.");
    }

    step(runner, root, "git", &["add", "."], true)?;
    let diff = step(runner, root, "git", &["diff", "--cached", "--quiet"], false)?;
    match diff.code {
        Some(0) => info!("No changes to commit."),
        Some(1) => {
            let message = format!("Release: {tag}");
            step(runner, root, "git", &["commit", "-m", message.as_str()], true)?;
            step(runner, root, "git", &["push", "origin", "main"], true)?;
        }
        code => {
            return Err(StepFailed {
                command: "git diff --cached --quiet".to_string(),
                code,
            }
            .into())
        }
    }

    let existing = step(runner, root, "git", &["tag", "--list", tag.as_str()], true)?;
    if existing.stdout.lines().any(|l| l.trim() == tag) {
        error!(%tag, "Tag already exists");
        bail!("Tag {tag} already exists. Please bump the version.");
    }

    step(runner, root, "git", &["tag", tag.as_str()], true)?;
    step(runner, root, "git", &["push", "origin", tag.as_str()], true)?;

    info!(%tag, "Release {tag} completed successfully.");
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};
    use tempfile::tempdir;

    #[test]
    fn tags_are_validated() {
        assert!(validate_tag("v1.2.3").is_ok());
        assert!(validate_tag("v1.2.3-rc.1").is_ok());
        assert!(validate_tag("v1.2").is_err());
        assert!(validate_tag("v1.2.3; rm -rf /").is_err());
    }

    #[test]
    fn step_failure_carries_the_exit_code() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_| {
            Ok(CommandOutput {
                code: Some(3),
                stdout: String::new(),
            })
        });
        let err = step(&runner, Path::new("."), "ruff", &["check", "."], true).unwrap_err();
        let failed = err.downcast_ref::<StepFailed>().unwrap();
        assert_eq!(failed.exit_code(), 3);
        assert_eq!(failed.command, "ruff check .");
    }

    #[test]
    fn system_runner_refuses_unknown_programs() {
        let dir = tempdir().unwrap();
        let runner = SystemRunner::new(dir.path());
        let err = runner
            .run(Invocation::new("rm", &["-rf", "/"], dir.path()))
            .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn missing_venv_needs_reinstall() {
        let dir = tempdir().unwrap();
        assert!(should_reinstall(dir.path()));
        create_dir_all(dir.path().join(VENV_DIR)).unwrap();
        assert!(!should_reinstall(dir.path()));
        assert!(verify_venv(dir.path()).is_err());
    }

    #[test]
    fn version_file_prefix_is_normalised() {
        let dir = tempdir().unwrap();
        write(dir.path().join(VERSION_FILENAME), "vbad\n").unwrap();
        let runner = MockCommandRunner::new();
        let err = release(&runner, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid release tag: vbad"));
    }
}
