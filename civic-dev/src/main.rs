use std::process::ExitCode;

use civic_dev::cli::{run, Cli};
use civic_dev::workflow::StepFailed;
use civic_dev_core::config::{load_runtime_config, RuntimeConfig};
use civic_dev_core::layout::find_project_root;
use civic_dev_core::logging::{init_logging, resolve_log_level, LoggingOptions};
use civic_dev_core::policy::{load_project_policy, ProjectPolicy};
use clap::Parser;

/// Logging goes to the project's log directory when a project is found,
/// otherwise to stderr only.
fn logging_options(cli: &Cli) -> LoggingOptions {
    let start = cli
        .root
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    let root = find_project_root(&start).ok();

    let policy = root
        .as_deref()
        .and_then(|r| load_project_policy(Some(r), None).ok())
        .unwrap_or_default();
    let runtime = root
        .as_deref()
        .and_then(|r| load_runtime_config(r).ok())
        .unwrap_or_default();
    let level = resolve_log_level(cli.log_level.as_deref(), &runtime, &policy);

    match root {
        Some(r) => LoggingOptions::for_project(&r, &policy, level),
        None => LoggingOptions::console_only(level),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_logging(&logging_options(&cli)) {
        eprintln!("Logging setup failed, continuing without file logs: {e}");
        let fallback = LoggingOptions::console_only(resolve_log_level(
            cli.log_level.as_deref(),
            &RuntimeConfig::default(),
            &ProjectPolicy::default(),
        ));
        let _ = init_logging(&fallback);
    }
    tracing::info!("CLI arguments parsed, invoking run");

    match run(cli).await {
        Ok(0) => {
            tracing::info!("CLI completed successfully");
            ExitCode::SUCCESS
        }
        Ok(code) => {
            tracing::info!(code, "CLI completed with a failing status");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<StepFailed>().map_or(1, StepFailed::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
