use std::fs::{create_dir_all, write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use civic_dev::workflow::{
    install_deps, prep_code, release, venv_python, CommandOutput, Invocation, MockCommandRunner,
    StepFailed, VENV_DIR,
};
use tempfile::tempdir;

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
    }
}

/// A mock that records every invocation and answers with `respond`.
fn recording_runner<F>(respond: F) -> (MockCommandRunner, Arc<Mutex<Vec<String>>>)
where
    F: Fn(&Invocation) -> CommandOutput + Send + 'static,
{
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    let mut runner = MockCommandRunner::new();
    runner.expect_run().returning(move |invocation| {
        let output = respond(&invocation);
        seen.lock().unwrap().push(invocation.to_string());
        Ok(output)
    });
    (runner, calls)
}

fn fake_venv(root: &Path) -> String {
    let python = venv_python(root);
    create_dir_all(python.parent().unwrap()).unwrap();
    write(&python, "").unwrap();
    python.to_string_lossy().into_owned()
}

#[test]
fn prep_code_runs_format_lint_hooks_and_tests_in_order() {
    let dir = tempdir().unwrap();
    create_dir_all(dir.path().join(VENV_DIR)).unwrap();

    let (runner, calls) = recording_runner(|_| ok(""));

    prep_code(&runner, dir.path()).unwrap();

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "ruff format .",
            "ruff check . --fix",
            "pre-commit run --all-files",
            "pre-commit run --all-files",
            "pytest tests",
        ]
    );
}

#[test]
fn prep_code_tolerates_first_hook_pass_failing() {
    let dir = tempdir().unwrap();
    create_dir_all(dir.path().join(VENV_DIR)).unwrap();

    let hook_runs = Arc::new(Mutex::new(0));
    let counter = hook_runs.clone();
    let (runner, _calls) = recording_runner(move |inv| {
        if inv.is("pre-commit", &["run", "--all-files"]) {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                return CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                };
            }
        }
        ok("")
    });

    prep_code(&runner, dir.path()).unwrap();
    assert_eq!(*hook_runs.lock().unwrap(), 2);
}

#[test]
fn prep_code_stops_on_failing_tests_with_their_exit_code() {
    let dir = tempdir().unwrap();
    create_dir_all(dir.path().join(VENV_DIR)).unwrap();

    let (runner, _calls) = recording_runner(|inv| {
        if inv.program == "pytest" {
            CommandOutput {
                code: Some(5),
                stdout: String::new(),
            }
        } else {
            ok("")
        }
    });

    let err = prep_code(&runner, dir.path()).unwrap_err();
    let failed = err.downcast_ref::<StepFailed>().unwrap();
    assert_eq!(failed.exit_code(), 5);
    assert_eq!(failed.command, "pytest tests");
}

#[test]
fn prep_code_refuses_without_a_venv() {
    let dir = tempdir().unwrap();
    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let err = prep_code(&runner, dir.path()).unwrap_err();
    assert!(err.to_string().contains("install-deps"));
}

#[test]
fn install_deps_treats_hook_install_failure_as_warning() {
    let dir = tempdir().unwrap();
    let python = fake_venv(dir.path());
    write(dir.path().join("requirements-dev.txt"), "pytest\n").unwrap();

    let (runner, calls) = recording_runner(|inv| {
        if inv.args.iter().any(|a| a == "pre_commit") {
            CommandOutput {
                code: Some(1),
                stdout: String::new(),
            }
        } else {
            ok("")
        }
    });

    install_deps(&runner, dir.path(), true).unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls[1],
        format!("{python} -m pip install -e .[dev] --timeout 100 --no-cache-dir --prefer-binary")
    );
    assert!(calls[2].contains("-r requirements-dev.txt"));
    assert_eq!(calls[3], format!("{python} -m pre_commit install"));
}

#[test]
fn install_deps_requires_the_venv_interpreter() {
    let dir = tempdir().unwrap();
    create_dir_all(dir.path().join(VENV_DIR)).unwrap();
    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    let err = install_deps(&runner, dir.path(), false).unwrap_err();
    assert!(err.to_string().contains("Python not found"));
}

#[test]
fn release_commits_tags_and_pushes() {
    let dir = tempdir().unwrap();
    write(dir.path().join("VERSION"), "1.2.0\n").unwrap();

    let (runner, calls) = recording_runner(|inv| {
        if inv.is("git", &["diff", "--cached", "--quiet"]) {
            CommandOutput {
                code: Some(1),
                stdout: String::new(),
            }
        } else {
            ok("")
        }
    });

    let tag = release(&runner, dir.path()).unwrap();
    assert_eq!(tag, "v1.2.0");

    let calls = calls.lock().unwrap();
    assert!(calls[0].starts_with("pre-commit autoupdate --repo"));
    assert_eq!(
        calls[1..],
        [
            "ruff format .",
            "ruff check . --fix",
            "pre-commit run --all-files",
            "git add .",
            "pre-commit run --all-files",
            "git add .",
            "pre-commit run --all-files",
            "git add .",
            "git diff --cached --quiet",
            "git commit -m Release: v1.2.0",
            "git push origin main",
            "git tag --list v1.2.0",
            "git tag v1.2.0",
            "git push origin v1.2.0",
        ]
    );
}

#[test]
fn release_installs_with_venv_and_runs_tests_when_present() {
    let dir = tempdir().unwrap();
    write(dir.path().join("VERSION"), "v0.9.1\n").unwrap();
    write(dir.path().join("pyproject.toml"), "[project]\nname = \"x\"\n").unwrap();
    create_dir_all(dir.path().join("tests")).unwrap();
    let python = fake_venv(dir.path());

    let (runner, calls) = recording_runner(|_| ok(""));

    let tag = release(&runner, dir.path()).unwrap();
    assert_eq!(tag, "v0.9.1");

    let calls = calls.lock().unwrap();
    assert_eq!(calls[1], format!("{python} -m pip install -e ."));
    assert!(calls.iter().any(|c| c == "pytest"));
    assert!(!calls.iter().any(|c| c.starts_with("git commit")));
    assert_eq!(calls.last().unwrap(), "git push origin v0.9.1");
}

#[test]
fn release_refuses_an_existing_tag() {
    let dir = tempdir().unwrap();
    write(dir.path().join("VERSION"), "1.2.0\n").unwrap();

    let (runner, calls) = recording_runner(|inv| {
        if inv.is("git", &["tag", "--list", "v1.2.0"]) {
            ok("v1.2.0\n")
        } else {
            ok("")
        }
    });

    let err = release(&runner, dir.path()).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert!(!calls.lock().unwrap().iter().any(|c| c == "git tag v1.2.0"));
}

#[test]
fn release_without_version_file_fails_before_running_anything() {
    let dir = tempdir().unwrap();
    let mut runner = MockCommandRunner::new();
    runner.expect_run().never();

    assert!(release(&runner, dir.path()).is_err());
}
