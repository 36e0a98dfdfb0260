///
/// This module implements the CLI interface for civic-dev: command parsing,
/// argument validation and the async entrypoint shared by `main` and the
/// integration tests.
///
/// All documentation, fetching and policy logic lives in [`civic-dev-core`].
/// This module only wires arguments to it and maps outcomes to exit codes.
///
/// ## How To Use
/// - From a shell: run the `civic-dev` binary with `--help`.
/// - Programmatically: build a [`Cli`] and call [`run`], which returns the
///   process exit code.
///
/// [`civic-dev-core`]: ../../civic-dev-core/
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use civic_dev_core::checks::{check_policy, RepoType};
use civic_dev_core::config::load_api_key;
use civic_dev_core::contract::ApiExtractor;
use civic_dev_core::error::FetchError;
use civic_dev_core::extract::StaticExtractor;
use civic_dev_core::graphql::{handle_transport_error, paged_query, GraphQLClient};
use civic_dev_core::layout::{find_project_root, format_layout, verify_layout, ProjectLayout};
use civic_dev_core::logging::{log_agent_end, log_agent_start};
use civic_dev_core::reflect::ReflectExtractor;
use civic_dev_core::render::OutputFormat;
use civic_dev_core::report::{generate_index, REPORTS_DIR};
use civic_dev_core::site::publish_api_docs;
use civic_dev_core::version::{bump_version, check_version};

use crate::workflow::{self, SystemRunner};

/// CLI for civic-dev: developer workflows for Civic Interconnect projects.
#[derive(Parser)]
#[clap(
    name = "civic-dev",
    version,
    about = "Install, format, test, document and release Civic Interconnect Python projects"
)]
pub struct Cli {
    /// Directory to start project discovery from (defaults to the current directory)
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log level override (TRACE, DEBUG, INFO, WARNING, ERROR)
    #[clap(long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Parse source files without executing them
    Static,
    /// Import each module in a Python interpreter
    Reflect,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install project and dev dependencies into the existing .venv
    InstallDeps {
        /// Install the project in editable mode
        #[clap(long)]
        editable: bool,
    },
    /// Format, lint and test the project
    PrepCode,
    /// Replace OLD with NEW in the project's versioned files
    #[clap(alias = "bump")]
    BumpVersion { old: String, new: String },
    /// Tag and push the version in the VERSION file
    Release,
    /// Generate API docs, the home page and the site config
    BuildApi {
        #[clap(long, value_enum, default_value_t = Strategy::Static)]
        strategy: Strategy,
        /// Output formats (yaml, markdown)
        #[clap(long = "format", default_values_t = vec!["yaml".to_string(), "markdown".to_string()])]
        formats: Vec<String>,
        /// Interpreter used by the reflect strategy
        #[clap(long, default_value = "python3")]
        python: String,
    },
    /// Check the project against its policy
    CheckPolicy {
        /// python, node or pwa
        #[clap(long, default_value = "python")]
        repo_type: String,
    },
    /// Show and verify the discovered project layout
    Layout,
    /// Check that an agent version is compatible with a library version
    CheckVersion {
        agent: String,
        lib: String,
        /// Require an exact match
        #[clap(long)]
        strict: bool,
    },
    /// Fetch every page of a GraphQL query and print the records as JSON
    Fetch {
        #[clap(long)]
        url: String,
        /// Environment variable holding the bearer token
        #[clap(long)]
        api_key_env: String,
        #[clap(long)]
        query_file: PathBuf,
        /// Dotted path to the record list, e.g. bills.results
        #[clap(long)]
        data_path: String,
        /// Dotted path to pageInfo when it is not next to the records
        #[clap(long)]
        page_info_path: Option<String>,
        /// Write the JSON here instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Rebuild the index of the latest agent reports
    ReportIndex {
        /// Reports directory (defaults to <project root>/reports)
        #[clap(long)]
        dir: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::InstallDeps { .. } => "install-deps",
            Commands::PrepCode => "prep-code",
            Commands::BumpVersion { .. } => "bump-version",
            Commands::Release => "release",
            Commands::BuildApi { .. } => "build-api",
            Commands::CheckPolicy { .. } => "check-policy",
            Commands::Layout => "layout",
            Commands::CheckVersion { .. } => "check-version",
            Commands::Fetch { .. } => "fetch",
            Commands::ReportIndex { .. } => "report-index",
        }
    }
}

fn start_dir(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    match cli_root {
        Some(p) => Ok(p),
        None => std::env::current_dir().context("Cannot read the current directory"),
    }
}

/// Project root above `start`, or `start` itself when none is marked.
fn project_root_or(start: &Path) -> PathBuf {
    find_project_root(start).unwrap_or_else(|_| start.to_path_buf())
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Extracted async CLI logic entrypoint for integration tests and main().
///
/// Returns the process exit code; errors are returned for main to report.
pub async fn run(cli: Cli) -> Result<i32> {
    tracing::info!("trace_initialised");

    let command_name = cli.command.name();
    log_agent_start(command_name);

    let result = match start_dir(cli.root) {
        Ok(start) => dispatch(cli.command, &start).await,
        Err(e) => Err(e),
    };

    match &result {
        Ok(0) => log_agent_end(command_name, "success"),
        Ok(code) => log_agent_end(command_name, &format!("exit {code}")),
        Err(e) => {
            tracing::error!(command = command_name, error = %e, "Command failed");
            log_agent_end(command_name, "error");
        }
    }
    result
}

async fn dispatch(command: Commands, start: &Path) -> Result<i32> {
    match command {
        Commands::InstallDeps { editable } => {
            let root = project_root_or(start);
            workflow::install_deps(&SystemRunner::new(&root), &root, editable).map(|_| 0)
        }
        Commands::PrepCode => {
            let root = project_root_or(start);
            workflow::prep_code(&SystemRunner::new(&root), &root).map(|_| 0)
        }
        Commands::Release => {
            let root = project_root_or(start);
            workflow::release(&SystemRunner::new(&root), &root).map(|tag| {
                println!("Release {tag} completed successfully.");
                0
            })
        }
        Commands::BumpVersion { old, new } => {
            let root = project_root_or(start);
            let updated = bump_version(&root, &old, &new)?;
            if updated > 0 {
                println!("{updated} file(s) updated.");
                Ok(0)
            } else {
                println!("No files were updated.");
                Ok(1)
            }
        }
        Commands::BuildApi {
            strategy,
            formats,
            python,
        } => {
            let formats = formats
                .iter()
                .map(|f| f.parse::<OutputFormat>())
                .collect::<Result<Vec<_>, _>>()?;
            let layout = ProjectLayout::discover(start)?;
            let extractor: Box<dyn ApiExtractor> = match strategy {
                Strategy::Static => Box::new(StaticExtractor),
                Strategy::Reflect => Box::new(ReflectExtractor::new(python)),
            };
            let index = publish_api_docs(&layout, extractor.as_ref(), &formats)?;
            println!(
                "Documented {} module(s) in {}",
                index.len(),
                layout.docs_api_dir.display()
            );
            Ok(0)
        }
        Commands::CheckPolicy { repo_type } => {
            let repo_type: RepoType = repo_type.parse().map_err(anyhow::Error::msg)?;
            let layout = ProjectLayout::discover(start)?;
            let issues = check_policy(&layout.project_root, repo_type, &layout.policy, &layout);
            if issues.is_empty() {
                println!("All project checks passed successfully.");
                Ok(0)
            } else {
                println!("Project checks found the following issues:\n");
                for issue in &issues {
                    println!("- {issue}");
                }
                Ok(1)
            }
        }
        Commands::Layout => {
            let layout = ProjectLayout::discover(start)?;
            println!("\n{}\n", format_layout(&layout));
            let issues = verify_layout(&layout);
            if issues.is_empty() {
                println!("Layout verified successfully.");
                Ok(0)
            } else {
                println!("Problems found:");
                for issue in &issues {
                    println!("- {issue}");
                }
                Ok(1)
            }
        }
        Commands::CheckVersion { agent, lib, strict } => {
            if check_version(&agent, &lib, strict) {
                println!("Versions compatible: agent={agent}, lib={lib}");
                Ok(0)
            } else {
                println!("Version mismatch: agent={agent}, lib={lib}");
                Ok(1)
            }
        }
        Commands::Fetch {
            url,
            api_key_env,
            query_file,
            data_path,
            page_info_path,
            output,
        } => {
            let api_key = load_api_key(&api_key_env, &url)?;
            let query = fs::read_to_string(&query_file)
                .with_context(|| format!("Failed to read query file {}", query_file.display()))?;
            let client = GraphQLClient::new(url.clone(), api_key);
            let data_path = split_path(&data_path);
            let page_info_path = page_info_path.as_deref().map(split_path);

            match paged_query(&client, &query, &data_path, page_info_path.as_deref()).await {
                Ok(records) => {
                    let body = serde_json::to_string_pretty(&records)?;
                    match output {
                        Some(path) => fs::write(&path, body)
                            .with_context(|| format!("Failed to write {}", path.display()))?,
                        None => println!("{body}"),
                    }
                    tracing::info!(records = records.len(), "Fetch complete");
                    Ok(0)
                }
                Err(FetchError::Transport(e)) => {
                    let message = handle_transport_error(e, client.url())?;
                    println!("{message}");
                    Ok(1)
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::ReportIndex { dir } => {
            let dir = dir.unwrap_or_else(|| project_root_or(start).join(REPORTS_DIR));
            let index = generate_index(&dir)?;
            println!("Report index written to {}", index.display());
            Ok(0)
        }
    }
}
