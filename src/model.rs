//! In-memory representation of a line coverage report and of the diff
//! coverage derived from it. Everything here is built once by the loader or
//! the aggregator and read-only afterwards.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use rust_decimal::Decimal;

/// Compute a coverage ratio as an exact decimal. An empty scope (zero
/// statements) counts as fully covered.
#[must_use]
pub fn compute_coverage(covered: usize, total: usize) -> Decimal {
    if total == 0 {
        Decimal::ONE
    } else {
        Decimal::from(covered as u64) / Decimal::from(total as u64)
    }
}

/// Report-level metadata recorded by the coverage tool.
#[derive(Debug, Clone)]
pub struct CoverageMetadata {
    pub version: String,
    pub timestamp: NaiveDateTime,
    pub branch_coverage: bool,
    pub show_contexts: bool,
}

/// Branch counts for one scope. The four counts always travel together:
/// either the report collected branch coverage or it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchInfo {
    pub num_branches: u64,
    pub num_partial_branches: u64,
    pub covered_branches: u64,
    pub missing_branches: u64,
}

/// Summary statistics for one scope: a single file, or the whole report.
#[derive(Debug, Clone)]
pub struct CoverageInfo {
    pub covered_lines: u64,
    pub num_statements: u64,
    /// Percentage as computed by the coverage tool, copied verbatim.
    /// Consumers derive their own ratios from the counts instead.
    pub percent_covered: Decimal,
    pub percent_covered_display: String,
    pub missing_lines: u64,
    pub excluded_lines: u64,
    pub branches: Option<BranchInfo>,
}

/// Line-level coverage for a single source file. Line numbers are 1-based
/// and the three sets are disjoint.
#[derive(Debug, Clone)]
pub struct FileCoverage {
    pub path: String,
    /// Statement lines that ran at least once.
    pub executed_lines: BTreeSet<u32>,
    /// Statement lines that never ran.
    pub missing_lines: BTreeSet<u32>,
    /// Lines excluded from measurement.
    pub excluded_lines: BTreeSet<u32>,
    pub info: CoverageInfo,
}

/// A full coverage report.
#[derive(Debug, Clone)]
pub struct Coverage {
    pub meta: CoverageMetadata,
    pub info: CoverageInfo,
    /// Keyed by file path, in report order.
    pub files: IndexMap<String, FileCoverage>,
}

/// Diff coverage for a single file: how well the lines added by a diff are
/// covered. All line lists are ascending.
#[derive(Debug, Clone)]
pub struct FileDiffCoverage {
    pub path: String,
    /// Ratio of covered to coverable added lines, exact.
    pub percent_covered: Decimal,
    /// Added lines that are statements and ran.
    pub covered_statements: Vec<u32>,
    /// Added lines that are statements and never ran.
    pub missing_statements: Vec<u32>,
    /// Union of the two sets above.
    pub added_statements: Vec<u32>,
    /// Every line the diff added, coverable or not (blank lines, comments).
    pub added_lines: Vec<u32>,
}

impl FileDiffCoverage {
    #[must_use]
    pub fn total(&self) -> usize {
        self.added_statements.len()
    }
}

/// Diff coverage aggregated across every file touched by a diff.
#[derive(Debug, Clone)]
pub struct DiffCoverage {
    /// Coverable added lines across all files known to the report.
    pub total_num_lines: usize,
    /// Coverable added lines that never ran.
    pub total_num_violations: usize,
    pub total_percent_covered: Decimal,
    /// Raw added-line count, including files the report knows nothing
    /// about (new config files, documentation, ...).
    pub num_changed_lines: usize,
    /// Keyed by file path, in diff order. Only files present in the
    /// coverage report appear here.
    pub files: IndexMap<String, FileDiffCoverage>,
}

/// A maximal run of consecutive missing lines within one file of a diff.
/// `line_start..=line_end`, inclusive; a single missing line yields a
/// degenerate group with `line_start == line_end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}
