use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, Span};

use patchcov::cli::{self, CheckOptions, Style};
use patchcov::diff::{self, DiffSource, FileDiff, GitDiff, GitHubDiff, ModifiedRanges, StdinDiff};
use patchcov::github::{self, GitHubPublisher};
use patchcov::model::CoverageReport;
use patchcov::report::COMMENT_MARKER;
use patchcov::{ingest, logging};

/// patchcov: coverage of the lines a diff adds, with inline annotations.
#[derive(Parser)]
#[command(name = "patchcov", version, about)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Coverage files (SimpleCov JSON or LCOV). Repeat or comma-separate to merge.
    #[arg(
        long,
        global = true,
        env = "PATCHCOV_COVERAGE",
        value_delimiter = ',',
        default_value = "coverage/.resultset.json"
    )]
    coverage: Vec<PathBuf>,

    /// Override format detection (simplecov, lcov).
    #[arg(long, global = true)]
    format: Option<String>,

    /// Directory prefix to strip from coverage paths (e.g. the CI checkout).
    #[arg(long, global = true)]
    strip_root: Option<String>,

    /// Read sources from here to group uncovered lines by method.
    #[arg(long, global = true, env = "PATCHCOV_SOURCE_ROOT")]
    source_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DiffArgs {
    /// Git diff arguments, e.g. "HEAD~1" or "main...HEAD".
    #[arg(long, conflicts_with = "diff_file")]
    git_diff: Option<String>,

    /// Read the diff from a patch file.
    #[arg(long)]
    diff_file: Option<PathBuf>,

    /// Fetch the diff of the current pull request from GitHub.
    #[arg(long, conflicts_with_all = ["git_diff", "diff_file"])]
    github_diff: bool,

    /// Path prefix to prepend to diff paths for matching against coverage
    /// paths.
    #[arg(long)]
    path_prefix: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute coverage for lines added by a diff.
    Check {
        #[command(flatten)]
        diff: DiffArgs,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,

        /// Base URL of a browsable coverage report, for deep links.
        #[arg(long, env = "PATCHCOV_REPORT_URL")]
        report_url: Option<String>,

        /// Post a summary comment and inline annotations to the pull request.
        #[arg(long)]
        github: bool,

        /// Exit with status 1 when diff coverage is below this percentage.
        #[arg(long, env = "PATCHCOV_FAIL_UNDER")]
        fail_under: Option<f64>,
    },

    /// Show uncovered, display and relevant lines for a source file.
    Uncovered {
        /// The source file path (as stored in the coverage data).
        source_file: String,
    },

    /// Show the lines a diff adds, per file.
    Modified {
        #[command(flatten)]
        diff: DiffArgs,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    logging::init(args.verbose);
    let span = logging::run_span();

    let options = CheckOptions {
        source_root: args.source_root.clone(),
        ..CheckOptions::default()
    };

    match args.command {
        Commands::Check {
            ref diff,
            style,
            ref report_url,
            github: publish,
            fail_under,
        } => {
            let coverage = load_coverage(&args, &span);
            let source = diff_source(diff)?;
            let modified = read_modified(source.as_ref(), diff, &span);
            let options = CheckOptions {
                report_url: report_url.clone(),
                sha: source.sha().map(str::to_string),
                ..options
            };

            let (report, output) = cli::cmd_check(&coverage, &modified, style, &options, &span);
            print!("{output}");

            if publish {
                let context = github::Context::from_env()?;
                let publisher = GitHubPublisher::new(context, COMMENT_MARKER, span.clone());
                cli::cmd_publish(&report, &publisher).context("Failed to publish to GitHub")?;
            }

            let pct = report.analysis.stats.coverage_percentage;
            if let Some(threshold) = fail_under {
                if pct < threshold {
                    info!(parent: &span, pct, threshold, "diff coverage below threshold");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Uncovered { ref source_file } => {
            let coverage = load_coverage(&args, &span);
            print!("{}", cli::cmd_uncovered(&coverage, source_file, &options, &span)?);
        }
        Commands::Modified { ref diff } => {
            let source = diff_source(diff)?;
            let modified = read_modified(source.as_ref(), diff, &span);
            print!("{}", cli::cmd_modified(&modified));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_coverage(args: &Cli, span: &Span) -> CoverageReport {
    let report = ingest::load_lenient(&args.coverage, args.format.as_deref(), span);
    match args.strip_root.as_deref() {
        Some(root) => report.strip_root(root),
        None => report,
    }
}

fn diff_source(args: &DiffArgs) -> Result<Box<dyn DiffSource>> {
    let source: Box<dyn DiffSource> = if let Some(git_args) = &args.git_diff {
        Box::new(GitDiff {
            args: git_args.clone(),
        })
    } else if let Some(path) = &args.diff_file {
        Box::new(FileDiff { path: path.clone() })
    } else if args.github_diff {
        Box::new(GitHubDiff::from_env()?)
    } else {
        Box::new(StdinDiff)
    };
    Ok(source)
}

fn read_modified(source: &dyn DiffSource, args: &DiffArgs, span: &Span) -> ModifiedRanges {
    let modified = diff::modified_ranges(source, span);
    match args.path_prefix.as_deref() {
        Some(prefix) => diff::apply_path_prefix(modified, prefix),
        None => modified,
    }
}
