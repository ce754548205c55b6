//! Group the missing lines of a diff into contiguous ranges, one
//! [`Group`] per maximal run. These are what comments and annotations
//! point at: "lines 12-17 are new and untested".

use crate::model::{Coverage, DiffCoverage, Group};

/// Split an ascending, deduplicated line list into maximal runs of
/// consecutive numbers. Any gap, whatever its size, starts a new run; a
/// lone line yields a degenerate `(line, line)` run.
#[must_use]
pub fn contiguous_runs(lines: &[u32]) -> Vec<(u32, u32)> {
    let mut runs = Vec::new();
    let mut iter = lines.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };

    let mut start = first;
    let mut end = first;
    for line in iter {
        if line == end + 1 {
            end = line;
        } else {
            runs.push((start, end));
            start = line;
            end = line;
        }
    }
    runs.push((start, end));
    runs
}

/// Compute one [`Group`] per maximal run of consecutive missing-and-added
/// lines, file by file in diff order, ascending within each file.
#[must_use]
pub fn missing_diff_groups(coverage: &Coverage, diff_coverage: &DiffCoverage) -> Vec<Group> {
    let mut groups = Vec::new();
    for (path, file) in &diff_coverage.files {
        if !coverage.files.contains_key(path) {
            continue;
        }
        for (line_start, line_end) in contiguous_runs(&file.missing_statements) {
            groups.push(Group {
                file: path.clone(),
                line_start,
                line_end,
            });
        }
    }
    groups
}
