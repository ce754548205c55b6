//! Parse a unified diff to extract which lines were added in each file.
//! This feeds the diff-coverage computation: what percentage of newly
//! added lines are covered by tests.
//!
//! Also provides a [`DiffSource`] trait that abstracts over different
//! ways to obtain a diff (stdin, git, GitHub API).

use std::collections::VecDeque;
use std::process::Command;

use indexmap::IndexMap;

use crate::error::{DiffcovError, Result};
use crate::github;
use crate::model::{Coverage, FileCoverage};

// ---------------------------------------------------------------------------
// Diff sources
// ---------------------------------------------------------------------------

/// A source for obtaining a unified diff.
pub trait DiffSource {
    /// Fetch the diff text.
    fn fetch_diff(&self) -> Result<String>;
}

/// Diff from stdin.
pub struct StdinDiff;

impl DiffSource for StdinDiff {
    fn fetch_diff(&self) -> Result<String> {
        Ok(std::io::read_to_string(std::io::stdin())?)
    }
}

/// Diff from a git command (e.g., `git diff HEAD~1`).
pub struct GitDiff {
    /// Arguments to pass to `git diff`.
    pub args: String,
}

impl DiffSource for GitDiff {
    fn fetch_diff(&self) -> Result<String> {
        let diff_args: Vec<&str> = self.args.split_whitespace().collect();
        let output = Command::new("git").arg("diff").args(&diff_args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiffcovError::Other(format!("git diff failed: {stderr}")));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| DiffcovError::Other("git diff output not valid UTF-8".to_string()))
    }
}

/// Diff of a GitHub pull request, fetched through the API.
pub struct GitHubDiff {
    pub client: github::Client,
    pub pr_number: u64,
}

impl DiffSource for GitHubDiff {
    fn fetch_diff(&self) -> Result<String> {
        self.client.pr_diff(self.pr_number)
    }
}

// ---------------------------------------------------------------------------
// Diff parsing
// ---------------------------------------------------------------------------

/// Cursor over the lines of a diff. Scans peek before they advance, so a
/// line belonging to the next construct is never consumed by accident.
struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }
}

/// Parse a unified diff and return a map of file path -> added line
/// numbers (in the post-diff file), in the order files appear in the diff.
///
/// `coverage` supplies the ground truth used to trim hunk context lines;
/// see [`hunk_added_lines`]. Hunks whose file is unknown to the coverage
/// report are still returned so callers can count changed lines in
/// non-coverable files.
pub fn parse_diff(diff: &str, coverage: &Coverage) -> Result<IndexMap<String, Vec<u32>>> {
    let mut result: IndexMap<String, Vec<u32>> = IndexMap::new();
    let mut current_file: Option<String> = None;
    let mut cursor = LineCursor::new(diff);

    while let Some(line) = cursor.advance() {
        if let Some(path) = line.strip_prefix("+++ b/") {
            current_file = Some(path.to_string());
        } else if line.starts_with("@@") {
            let file = current_file.as_ref().and_then(|f| coverage.files.get(f));
            let lines = hunk_added_lines(line, file, &mut cursor)?;
            if lines.is_empty() {
                continue;
            }
            match current_file {
                Some(ref file) => result.entry(file.clone()).or_default().extend(lines),
                None => {
                    return Err(DiffcovError::MalformedDiff(
                        "hunk with added lines before any '+++ b/' marker".to_string(),
                    ))
                }
            }
        }
    }

    Ok(result)
}

/// Extract the added line numbers claimed by one hunk header:
///
/// ```text
/// @@ -60,0 +61 @@ def compute(     -> [64]
/// @@ -60,0 +61,9 @@ def compute(   -> [64, 65, ..., 69]
/// ```
///
/// Diffs carry up to 3 unchanged context lines at each end of a hunk,
/// truncated at the physical start and end of the file, so the claimed
/// range is wider than the set of added lines. The file's last executed
/// line + 1 serves as a file-length proxy deciding whether the hunk tail
/// reaches end-of-file. At the start of the file the leading context is
/// measured by scanning the hunk body; at the end it is trimmed by
/// scanning the body tail for unchanged lines.
///
/// Without coverage data for the file there is no proxy: assume the full
/// 3-line leading context (none when the hunk starts at line 1) and keep
/// the tail.
fn hunk_added_lines(
    header: &str,
    file: Option<&FileCoverage>,
    cursor: &mut LineCursor<'_>,
) -> Result<Vec<u32>> {
    let (mut start, length) = parse_hunk_header(header)?;
    let mut end = start + length;

    let last_executed = match file.and_then(|f| f.executed_lines.last()) {
        Some(&line) => i64::from(line),
        None => {
            if start != 1 {
                start += 3;
            }
            return Ok(collect_range(start, end));
        }
    };
    let file_length_proxy = last_executed + 1;

    if start == 1 {
        // Hunk starts at the top of the file: the leading context is
        // whatever unchanged lines actually precede the first change.
        while cursor.peek().is_some_and(|line| line.starts_with(' ')) {
            cursor.advance();
            start += 1;
        }
    } else {
        start += 3;
    }

    if end < file_length_proxy {
        end -= 3;
    } else {
        // The hunk reaches the end of the file: only trim body lines
        // actually marked as unchanged context.
        let mut tail: VecDeque<&str> = VecDeque::with_capacity(3);
        while let Some(line) = cursor.peek() {
            if line.starts_with(' ') || line.starts_with('+') || line.starts_with('-') {
                if tail.len() == 3 {
                    tail.pop_front();
                }
                tail.push_back(line);
                cursor.advance();
            } else {
                break;
            }
        }
        while let Some(line) = tail.pop_back() {
            if line.starts_with(' ') {
                end -= 1;
            } else {
                break;
            }
        }
    }

    Ok(collect_range(start, end))
}

/// Parse `(new_start, new_length)` from a hunk header like
/// `@@ -10,5 +20,8 @@`; the length defaults to 1 when omitted. Both
/// numbers must fit in the u32 line-number range; the trim arithmetic
/// relies on that bound.
fn parse_hunk_header(header: &str) -> Result<(i64, i64)> {
    let malformed = || DiffcovError::MalformedDiff(format!("unparseable hunk header: {header}"));

    let field = header.split_whitespace().nth(2).ok_or_else(malformed)?;
    let field = field.strip_prefix('+').ok_or_else(malformed)?;
    let (start, length) = match field.split_once(',') {
        Some((start, length)) => (start, length),
        None => (field, "1"),
    };
    let start: i64 = start.parse().map_err(|_| malformed())?;
    let length: i64 = length.parse().map_err(|_| malformed())?;
    let line_numbers = 0..=i64::from(u32::MAX);
    if !line_numbers.contains(&start) || !line_numbers.contains(&length) {
        return Err(malformed());
    }
    Ok((start, length))
}

/// Collect `start..end` as 1-based line numbers. The trimming arithmetic
/// can push either bound past the other or below zero; such ranges are
/// simply empty.
fn collect_range(start: i64, end: i64) -> Vec<u32> {
    (start..end)
        .filter_map(|line| u32::try_from(line).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::*;
    use crate::model::{compute_coverage, CoverageInfo, CoverageMetadata};

    fn coverage_with(files: &[(&str, &[u32])]) -> Coverage {
        let mut map = IndexMap::new();
        for (path, executed) in files {
            let info = CoverageInfo {
                covered_lines: executed.len() as u64,
                num_statements: executed.len() as u64,
                percent_covered: compute_coverage(executed.len(), executed.len()),
                percent_covered_display: "100".to_string(),
                missing_lines: 0,
                excluded_lines: 0,
                branches: None,
            };
            map.insert(
                (*path).to_string(),
                FileCoverage {
                    path: (*path).to_string(),
                    executed_lines: executed.iter().copied().collect(),
                    missing_lines: BTreeSet::new(),
                    excluded_lines: BTreeSet::new(),
                    info,
                },
            );
        }
        Coverage {
            meta: CoverageMetadata {
                version: "7.4.4".to_string(),
                timestamp: "2024-05-10T12:34:56".parse().unwrap(),
                branch_coverage: false,
                show_contexts: false,
            },
            info: CoverageInfo {
                covered_lines: 0,
                num_statements: 0,
                percent_covered: Decimal::ONE,
                percent_covered_display: "100".to_string(),
                missing_lines: 0,
                excluded_lines: 0,
                branches: None,
            },
            files: map,
        }
    }

    // -- Hunk header tests ----------------------------------------------------

    #[test]
    fn test_parse_hunk_header() {
        assert_eq!(parse_hunk_header("@@ -10,5 +20,8 @@").unwrap(), (20, 8));
        assert_eq!(parse_hunk_header("@@ -0,0 +1,3 @@").unwrap(), (1, 3));
        assert_eq!(parse_hunk_header("@@ -5 +5 @@").unwrap(), (5, 1));
        assert_eq!(
            parse_hunk_header("@@ -60,0 +61,9 @@ def compute(").unwrap(),
            (61, 9)
        );
    }

    #[test]
    fn test_parse_hunk_header_malformed() {
        assert!(parse_hunk_header("@@").is_err());
        assert!(parse_hunk_header("@@ -1,2 garbage @@").is_err());
        assert!(parse_hunk_header("@@ -1,2 +x,y @@").is_err());
    }

    #[test]
    fn test_parse_hunk_header_out_of_range() {
        // Parseable as i64, impossible as line numbers.
        assert!(parse_hunk_header("@@ -0,0 +9223372036854775807,1 @@").is_err());
        assert!(parse_hunk_header("@@ -0,0 +1,9223372036854775806 @@").is_err());
        assert!(parse_hunk_header("@@ -0,0 +4294967296,1 @@").is_err());
        assert!(parse_hunk_header("@@ -1,2 +-5,1 @@").is_err());
    }

    // -- Cursor tests -----------------------------------------------------------

    #[test]
    fn test_line_cursor() {
        let mut cursor = LineCursor::new("a\nb");
        assert_eq!(cursor.peek(), Some("a"));
        assert_eq!(cursor.peek(), Some("a"));
        assert_eq!(cursor.advance(), Some("a"));
        assert_eq!(cursor.advance(), Some("b"));
        assert_eq!(cursor.peek(), None);
        assert_eq!(cursor.advance(), None);
    }

    // -- Diff parsing tests -------------------------------------------------

    #[test]
    fn test_parse_diff_new_file_unknown_to_coverage() {
        let diff = "\
+++ b/docs/notes.md
@@ -0,0 +1,3 @@
+one
+two
+three
";
        let coverage = coverage_with(&[]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["docs/notes.md"], vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_diff_trims_leading_context() {
        // Claimed range is 11..20; the three leading context lines are
        // trimmed and the tail scan finds no trailing context, leaving the
        // six added lines starting at 14.
        let diff = "\
+++ b/f.py
@@ -10,0 +11,9 @@
 ctx
 ctx
 ctx
+a
+b
+c
+d
+e
+f
";
        let coverage = coverage_with(&[("f.py", &[1, 5, 14])]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["f.py"], vec![14, 15, 16, 17, 18, 19]);
    }

    #[test]
    fn test_parse_diff_interior_hunk() {
        // Hunk well inside the file: three context lines at each end.
        let diff = "\
+++ b/f.py
@@ -10,9 +10,12 @@
 ctx
 ctx
 ctx
+a
+b
+c
+d
+e
+f
 ctx
 ctx
 ctx
";
        let coverage = coverage_with(&[("f.py", &[1, 50, 100])]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["f.py"], vec![13, 14, 15, 16, 17, 18]);
    }

    #[test]
    fn test_parse_diff_hunk_at_start_of_file() {
        // Two real context lines before the change, not three: the leading
        // scan counts them instead of assuming the full default context.
        let diff = "\
+++ b/f.py
@@ -1,5 +1,7 @@
 l1
 l2
+new3
+new4
 l3
 l4
 l5
";
        let coverage = coverage_with(&[("f.py", &[1, 2, 5, 6, 7])]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["f.py"], vec![3, 4]);
    }

    #[test]
    fn test_parse_diff_hunk_reaching_end_of_file() {
        // Additions at the very end of the file: nothing after the added
        // lines, so no trailing trim.
        let diff = "\
+++ b/f.py
@@ -8,3 +8,5 @@
 l8
 l9
 l10
+n11
+n12
";
        let coverage = coverage_with(&[("f.py", &[1, 2, 10])]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["f.py"], vec![11, 12]);
    }

    #[test]
    fn test_parse_diff_multiple_hunks_concatenate() {
        let diff = "\
+++ b/f.py
@@ -10,9 +10,12 @@
 ctx
 ctx
 ctx
+a
+b
+c
+d
+e
+f
 ctx
 ctx
 ctx
@@ -30,6 +33,7 @@
 ctx
 ctx
 ctx
+g
 ctx
 ctx
 ctx
";
        let coverage = coverage_with(&[("f.py", &[1, 99])]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["f.py"], vec![13, 14, 15, 16, 17, 18, 36]);
    }

    #[test]
    fn test_parse_diff_multiple_files_keep_diff_order() {
        let diff = "\
diff --git a/z.py b/z.py
+++ b/z.py
@@ -0,0 +1,2 @@
+a
+b
diff --git a/a.py b/a.py
+++ b/a.py
@@ -0,0 +1 @@
+c
";
        let coverage = coverage_with(&[]);
        let result = parse_diff(diff, &coverage).unwrap();
        let files: Vec<&String> = result.keys().collect();
        assert_eq!(files, ["z.py", "a.py"]);
        assert_eq!(result["z.py"], vec![1, 2]);
        assert_eq!(result["a.py"], vec![1]);
    }

    #[test]
    fn test_parse_diff_hunk_before_file_marker() {
        let diff = "\
@@ -0,0 +1,3 @@
+a
+b
+c
";
        let coverage = coverage_with(&[]);
        let err = parse_diff(diff, &coverage).unwrap_err();
        assert!(matches!(err, DiffcovError::MalformedDiff(_)));
    }

    #[test]
    fn test_parse_diff_huge_hunk_start_is_rejected() {
        // Hunk starts near i64::MAX parse fine but cannot be line numbers;
        // both the covered path and the no-coverage fallback must reject
        // them instead of computing a garbage range.
        let coverage = coverage_with(&[("f.py", &[1, 2])]);
        for diff in [
            "+++ b/f.py\n@@ -0,0 +9223372036854775807,1 @@\n",
            "+++ b/unknown.py\n@@ -0,0 +9223372036854775806,1 @@\n",
        ] {
            let err = parse_diff(diff, &coverage).unwrap_err();
            assert!(matches!(err, DiffcovError::MalformedDiff(_)));
        }
    }

    #[test]
    fn test_parse_diff_empty_range_without_file_marker() {
        // A hunk that adds nothing is tolerated even before any file
        // marker; deletions in preamble-less diffs hit this.
        let diff = "\
@@ -1,3 +0,0 @@
-a
-b
-c
";
        let coverage = coverage_with(&[]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_diff_deleted_file() {
        let diff = "\
diff --git a/gone.py b/gone.py
--- a/gone.py
+++ /dev/null
@@ -1,3 +0,0 @@
-a
-b
-c
";
        let coverage = coverage_with(&[]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_diff_empty_input() {
        let coverage = coverage_with(&[]);
        let result = parse_diff("", &coverage).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_parse_diff_no_executed_lines_falls_back() {
        // A file the report knows but never executed has no length proxy:
        // same fixed trim as an unknown file.
        let diff = "\
+++ b/f.py
@@ -10,0 +11,9 @@
 ctx
 ctx
 ctx
+a
";
        let coverage = coverage_with(&[("f.py", &[])]);
        let result = parse_diff(diff, &coverage).unwrap();
        assert_eq!(result["f.py"], vec![14, 15, 16, 17, 18, 19]);
    }
}
