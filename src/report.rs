//! Output formatting for diff coverage results.

use std::fmt::Write;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::groups::contiguous_runs;
use crate::model::{compute_coverage, Coverage, CoverageInfo, DiffCoverage, FileDiffCoverage};

/// Sentence rendered when the diff contains no coverable changes.
const EMPTY_DIFF_SENTENCE: &str =
    "_This PR does not seem to contain any modification to coverable code._";

/// Hidden HTML marker embedded in posted comments so a later run can find
/// and update its own comment. The subproject id keeps markers distinct
/// when several jobs comment on the same pull request.
#[must_use]
pub fn comment_marker(subproject_id: Option<&str>) -> String {
    match subproject_id {
        Some(id) => format!("<!-- This comment was generated by diffcov (id: {id}) -->"),
        None => "<!-- This comment was generated by diffcov -->".to_string(),
    }
}

/// Render a ratio as a percentage, floored to two decimal places with
/// trailing zeros trimmed: `0.99999` is `99.99%`, not `100%`.
#[must_use]
pub fn pct(ratio: Decimal) -> String {
    let percent = (ratio * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero)
        .normalize();
    format!("{percent}%")
}

/// Format ascending line numbers as compact ranges, e.g. `1, 3-5, 8`.
/// With a file URL each range becomes a link into the file.
#[must_use]
pub fn format_line_ranges(lines: &[u32], url: Option<&str>) -> String {
    contiguous_runs(lines)
        .iter()
        .map(|&(start, end)| {
            let text = if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            };
            match url {
                Some(url) if start == end => format!("[{text}]({url}#L{start})"),
                Some(url) => format!("[{text}]({url}#L{start}-L{end})"),
                None => text,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything the formatters need to render one report.
pub struct ReportContext<'a> {
    pub coverage: &'a Coverage,
    pub diff_coverage: &'a DiffCoverage,
    /// `owner/name`, for file links in markdown output.
    pub repo_name: Option<&'a str>,
    /// Branch the file links point at.
    pub base_ref: Option<&'a str>,
    /// Hidden marker appended to markdown output.
    pub marker: Option<&'a str>,
    /// Cap on table rows; the worst-covered files win.
    pub max_files: usize,
}

impl<'a> ReportContext<'a> {
    /// Format using a specific formatter.
    #[must_use]
    pub fn format(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }

    fn file_url(&self, path: &str) -> Option<String> {
        let repo = self.repo_name?;
        let base_ref = self.base_ref?;
        Some(format!("https://github.com/{repo}/blob/{base_ref}/{path}"))
    }

    /// Files with at least one missing statement, worst coverage first.
    /// Ties keep diff order.
    fn files_with_misses(&self) -> Vec<&FileDiffCoverage> {
        let mut files: Vec<&FileDiffCoverage> = self
            .diff_coverage
            .files
            .values()
            .filter(|f| !f.missing_statements.is_empty())
            .collect();
        files.sort_by(|a, b| a.percent_covered.cmp(&b.percent_covered));
        files
    }
}

fn project_ratio(info: &CoverageInfo) -> Decimal {
    compute_coverage(info.covered_lines as usize, info.num_statements as usize)
}

/// Trait for formatting diff coverage reports.
pub trait ReportFormatter {
    /// Format the report to a string.
    fn format(&self, report: &ReportContext<'_>) -> String;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &ReportContext<'_>) -> String {
        let mut out = String::new();
        let diff_coverage = report.diff_coverage;

        if diff_coverage.files.is_empty() {
            out.push_str("No coverable changes in the diff.\n");
            return out;
        }

        let covered = diff_coverage.total_num_lines - diff_coverage.total_num_violations;
        let total = diff_coverage.total_num_lines;
        let changed = diff_coverage.num_changed_lines;
        let diff_pct = pct(diff_coverage.total_percent_covered);
        writeln!(
            out,
            "Diff coverage: {diff_pct} ({covered}/{total} statements, {changed} changed lines)"
        )
        .unwrap();

        let files_with_misses = report.files_with_misses();
        if !files_with_misses.is_empty() {
            out.push('\n');
            for file in &files_with_misses {
                let path = &file.path;
                let file_covered = file.covered_statements.len();
                let file_total = file.total();
                let file_pct = pct(file.percent_covered);
                let missing = format_line_ranges(&file.missing_statements, None);
                writeln!(
                    out,
                    "  {path}  {file_covered}/{file_total} ({file_pct})  missing: {missing}"
                )
                .unwrap();
            }
        }

        out.push('\n');
        writeln!(
            out,
            "Project coverage: {}",
            pct(project_ratio(&report.coverage.info))
        )
        .unwrap();
        out
    }
}

/// Markdown formatter, shaped for a pull-request comment.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &ReportContext<'_>) -> String {
        let mut md = String::new();
        let diff_coverage = report.diff_coverage;

        md.push_str("## Coverage report\n\n");

        if diff_coverage.files.is_empty() {
            md.push_str(EMPTY_DIFF_SENTENCE);
            md.push('\n');
        } else {
            let covered = diff_coverage.total_num_lines - diff_coverage.total_num_violations;
            let total = diff_coverage.total_num_lines;
            let changed = diff_coverage.num_changed_lines;
            let diff_pct = pct(diff_coverage.total_percent_covered);
            writeln!(
                md,
                "Diff coverage: **{diff_pct}** ({covered}/{total} statements, {changed} changed lines)."
            )
            .unwrap();
            writeln!(
                md,
                "Project coverage: **{}**.",
                pct(project_ratio(&report.coverage.info))
            )
            .unwrap();

            let files_with_misses = report.files_with_misses();
            if files_with_misses.is_empty() {
                md.push_str("\nAll added statements are covered.\n");
            } else {
                md.push_str("\n| File | Diff coverage | Missing lines |\n");
                md.push_str("|:-----|--------------:|:--------------|\n");

                for file in files_with_misses.iter().take(report.max_files) {
                    let path = &file.path;
                    let url = report.file_url(path);
                    let name = match url.as_deref() {
                        Some(url) => format!("[`{path}`]({url})"),
                        None => format!("`{path}`"),
                    };
                    let file_pct = pct(file.percent_covered);
                    let missing = format_line_ranges(&file.missing_statements, url.as_deref());
                    writeln!(md, "| {name} | {file_pct} | {missing} |").unwrap();
                }

                if files_with_misses.len() > report.max_files {
                    let shown = report.max_files;
                    let total_files = files_with_misses.len();
                    writeln!(
                        md,
                        "\n_The report is truncated to {shown} of {total_files} files with missing lines._"
                    )
                    .unwrap();
                }
            }
        }

        if let Some(marker) = report.marker {
            md.push('\n');
            md.push_str(marker);
            md.push('\n');
        }
        md
    }
}
