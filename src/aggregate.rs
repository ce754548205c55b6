//! Correlate the lines a diff added with the coverage report's executed
//! and missing sets, per file and in total.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::model::{compute_coverage, Coverage, DiffCoverage, FileDiffCoverage};

/// Compute diff coverage from the per-file added lines of a diff.
///
/// Files unknown to the coverage report contribute to `num_changed_lines`
/// only; they have no statements to measure. File order follows
/// `added_lines`, so the output is deterministic for a given diff.
#[must_use]
pub fn compute_diff_coverage(
    added_lines: &IndexMap<String, Vec<u32>>,
    coverage: &Coverage,
) -> DiffCoverage {
    let mut files = IndexMap::new();
    let mut total_num_lines = 0;
    let mut total_num_violations = 0;
    let mut num_changed_lines = 0;

    for (path, added) in added_lines {
        num_changed_lines += added.len();

        let Some(file) = coverage.files.get(path) else {
            continue;
        };

        let added_set: BTreeSet<u32> = added.iter().copied().collect();
        let covered_statements: Vec<u32> = file
            .executed_lines
            .intersection(&added_set)
            .copied()
            .collect();
        let missing_statements: Vec<u32> = file
            .missing_lines
            .intersection(&added_set)
            .copied()
            .collect();

        // Executed and missing are disjoint, so chain + sort is a union.
        let mut added_statements: Vec<u32> = covered_statements
            .iter()
            .chain(missing_statements.iter())
            .copied()
            .collect();
        added_statements.sort_unstable();

        total_num_lines += added_statements.len();
        total_num_violations += missing_statements.len();

        let percent_covered = compute_coverage(covered_statements.len(), added_statements.len());
        files.insert(
            path.clone(),
            FileDiffCoverage {
                path: path.clone(),
                percent_covered,
                covered_statements,
                missing_statements,
                added_statements,
                added_lines: added.clone(),
            },
        );
    }

    DiffCoverage {
        total_num_lines,
        total_num_violations,
        total_percent_covered: compute_coverage(
            total_num_lines - total_num_violations,
            total_num_lines,
        ),
        num_changed_lines,
        files,
    }
}
