use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use diffcov::cli::{self, Style};
use diffcov::config::{self, Config};
use diffcov::diff::{DiffSource, GitDiff, GitHubDiff, StdinDiff};
use diffcov::error::DiffcovError;
use diffcov::github::{AnnotationType, Client};

/// diffcov — Diff coverage reports, comments and annotations for pull requests.
#[derive(Parser)]
#[command(name = "diffcov", version, about)]
struct Cli {
    /// Verbose logging (also: DEBUG=1).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a diff-coverage report for a coverage file and a diff.
    Report {
        /// Path to the JSON coverage report.
        #[arg(long, default_value = "coverage.json")]
        coverage: PathBuf,

        /// Git diff arguments, e.g. "HEAD~1" or "main...HEAD".
        /// If omitted, reads a unified diff from stdin.
        #[arg(long)]
        git_diff: Option<String>,

        /// Fetch the pull request diff from GitHub instead (requires
        /// GITHUB_TOKEN and GITHUB_REPOSITORY).
        #[arg(long)]
        github: bool,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,
    },

    /// Print one annotation per run of missing added lines.
    Annotate {
        /// Path to the JSON coverage report.
        #[arg(long, default_value = "coverage.json")]
        coverage: PathBuf,

        /// Git diff arguments. If omitted, reads the diff from stdin.
        #[arg(long)]
        git_diff: Option<String>,

        /// Fetch the pull request diff from GitHub instead.
        #[arg(long)]
        github: bool,

        /// Annotation severity.
        #[arg(long, value_enum, default_value = "warning")]
        annotation_type: AnnotationType,

        /// Also write the annotations as JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Post or update the diff-coverage comment on the pull request.
    /// All settings come from the environment (GITHUB_TOKEN,
    /// GITHUB_REPOSITORY, GITHUB_REF, COVERAGE_PATH, ...).
    Comment,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.debug || config::env_flag("DEBUG"));

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Report {
            coverage,
            git_diff,
            github,
            style,
        } => {
            let source = diff_source(git_diff, github)?;
            let out = cli::cmd_report(&coverage, source.as_ref(), &style)?;
            print!("{out}");
            Ok(())
        }
        Commands::Annotate {
            coverage,
            git_diff,
            github,
            annotation_type,
            output,
        } => {
            let source = diff_source(git_diff, github)?;
            let out = cli::cmd_annotate(
                &coverage,
                source.as_ref(),
                annotation_type,
                output.as_deref(),
            )?;
            print!("{out}");
            Ok(())
        }
        Commands::Comment => {
            let config = Config::from_env()?;
            let out = cli::cmd_comment(&config)?;
            print!("{out}");
            Ok(())
        }
    }
}

fn diff_source(git_diff: Option<String>, github: bool) -> Result<Box<dyn DiffSource>> {
    if github {
        let config = Config::from_env()?;
        let client = Client::from_config(&config);
        let pr_number = client.pr_number(&config)?;
        Ok(Box::new(GitHubDiff { client, pr_number }))
    } else if let Some(args) = git_diff {
        Ok(Box::new(GitDiff { args }))
    } else {
        Ok(Box::new(StdinDiff))
    }
}

fn setup_logging(debug: bool) {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            builder.filter_level(if debug {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            });
        }
    }
    builder.init();
}

/// The two expected failure modes get a friendly explanation instead of a
/// raw error chain.
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<DiffcovError>() {
        Some(DiffcovError::CannotGetPullRequest(reason)) => {
            log::info!(
                "This workflow is not running on a pull request, and no open pull request \
                 matches the current branch ({reason}). Nothing to do."
            );
        }
        Some(DiffcovError::CannotPostComment(reason)) => {
            log::info!(
                "Cannot post the comment. This is probably because the body reached the \
                 maximum allowed length ({reason})."
            );
        }
        _ => log::error!("{err:#}"),
    }
}
