use diffcov::aggregate;
use diffcov::diff;
use diffcov::model::{Coverage, DiffCoverage};

/// Parse the shared coverage fixture (src/app.py, src/util.py, src/empty.py).
pub fn coverage() -> Coverage {
    diffcov::coverage::parse_report(include_str!("../fixtures/coverage.json")).unwrap()
}

/// Run the full correlation pipeline on a diff against the shared fixture.
pub fn correlate(diff_text: &str) -> (Coverage, DiffCoverage) {
    let coverage = coverage();
    let added_lines = diff::parse_diff(diff_text, &coverage).unwrap();
    let diff_coverage = aggregate::compute_diff_coverage(&added_lines, &coverage);
    (coverage, diff_coverage)
}
