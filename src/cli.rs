//! Command handler functions for the diffcov CLI.
//!
//! Each `cmd_*` function returns its stdout output as a `String`, making
//! them easy to test without capturing stdout.

use std::fmt::Write;
use std::path::Path;

use clap::ValueEnum;
use log::{debug, info};

use crate::config::{Config, DEFAULT_MAX_FILES};
use crate::diff::DiffSource;
use crate::error::{DiffcovError, Result};
use crate::github::{self, Annotation, AnnotationType, Client};
use crate::model::{Coverage, DiffCoverage};
use crate::report::{MarkdownFormatter, ReportContext, ReportFormatter, TextFormatter};
use crate::{aggregate, coverage, diff, groups, report};

/// Output style for the `report` command.
#[derive(Clone, ValueEnum)]
pub enum Style {
    Text,
    Markdown,
}

/// Load the coverage report, obtain the diff and correlate the two.
fn correlate(coverage_path: &Path, source: &dyn DiffSource) -> Result<(Coverage, DiffCoverage)> {
    let coverage = coverage::load_coverage(coverage_path)?;
    debug!("Loaded coverage for {} files", coverage.files.len());
    let diff_text = source.fetch_diff()?;
    let added_lines = diff::parse_diff(&diff_text, &coverage)?;
    let diff_coverage = aggregate::compute_diff_coverage(&added_lines, &coverage);
    Ok((coverage, diff_coverage))
}

fn render_annotations(annotations: &[Annotation]) -> String {
    let mut out = String::new();
    for annotation in annotations {
        writeln!(out, "{annotation}").unwrap();
    }
    out
}

fn write_annotations_json(annotations: &[Annotation], path: &Path) -> Result<()> {
    let json = serde_json::to_string(annotations)
        .map_err(|e| DiffcovError::Other(format!("serializing annotations: {e}")))?;
    std::fs::write(path, json)?;
    info!(
        "Wrote {} annotations to {}",
        annotations.len(),
        path.display()
    );
    Ok(())
}

/// Print a diff-coverage report for a local coverage file and a diff.
pub fn cmd_report(coverage_path: &Path, source: &dyn DiffSource, style: &Style) -> Result<String> {
    let (coverage, diff_coverage) = correlate(coverage_path, source)?;
    let context = ReportContext {
        coverage: &coverage,
        diff_coverage: &diff_coverage,
        repo_name: None,
        base_ref: None,
        marker: None,
        max_files: DEFAULT_MAX_FILES,
    };
    let formatter: &dyn ReportFormatter = match style {
        Style::Text => &TextFormatter,
        Style::Markdown => &MarkdownFormatter,
    };
    Ok(context.format(formatter))
}

/// Print one annotation per contiguous run of missing added lines,
/// optionally writing them as JSON too.
pub fn cmd_annotate(
    coverage_path: &Path,
    source: &dyn DiffSource,
    annotation_type: AnnotationType,
    output: Option<&Path>,
) -> Result<String> {
    let (coverage, diff_coverage) = correlate(coverage_path, source)?;
    let missing = groups::missing_diff_groups(&coverage, &diff_coverage);
    let annotations = github::create_missing_coverage_annotations(annotation_type, &missing);

    if let Some(path) = output {
        write_annotations_json(&annotations, path)?;
    }
    if annotations.is_empty() {
        return Ok("All changed lines are covered.\n".to_string());
    }
    Ok(render_annotations(&annotations))
}

/// Full pull-request flow: resolve the PR, fetch its diff, compute diff
/// coverage, then create or update the report comment. Returns the text
/// destined for stdout (the annotations, when enabled).
pub fn cmd_comment(config: &Config) -> Result<String> {
    if config.skip_coverage && !config.annotate_missing_lines {
        info!("Nothing to do: SKIP_COVERAGE is set and ANNOTATE_MISSING_LINES is not");
        return Ok(String::new());
    }

    let client = Client::from_config(config);
    let pr_number = client.pr_number(config)?;
    debug!("Operating on pull request #{pr_number}");

    let coverage = coverage::load_coverage(&config.coverage_path)?;
    let diff_text = client.pr_diff(pr_number)?;
    let added_lines = diff::parse_diff(&diff_text, &coverage)?;
    let diff_coverage = aggregate::compute_diff_coverage(&added_lines, &coverage);

    let mut out = String::new();
    if config.annotate_missing_lines {
        let missing = groups::missing_diff_groups(&coverage, &diff_coverage);
        let annotations =
            github::create_missing_coverage_annotations(config.annotation_type, &missing);
        out.push_str(&render_annotations(&annotations));
        if let Some(ref path) = config.annotations_output_path {
            write_annotations_json(&annotations, path)?;
        }
    }

    if config.skip_coverage {
        info!("Skipping the coverage comment (SKIP_COVERAGE is set)");
        return Ok(out);
    }

    let base_ref = match config.github_base_ref.clone() {
        Some(base_ref) => base_ref,
        None => client.repository_info()?.default_branch,
    };
    let marker = report::comment_marker(config.subproject_id.as_deref());
    let body = ReportContext {
        coverage: &coverage,
        diff_coverage: &diff_coverage,
        repo_name: Some(&config.github_repository),
        base_ref: Some(&base_ref),
        marker: Some(&marker),
        max_files: config.max_files_in_comment,
    }
    .format(&MarkdownFormatter);

    let me = client.my_login()?;
    client.post_comment(&me, pr_number, &body, &marker)?;
    info!(
        "Comment posted to {}#{pr_number}",
        config.github_repository
    );
    Ok(out)
}
