#![no_main]
use std::sync::OnceLock;

use diffcov::model::Coverage;
use libfuzzer_sys::fuzz_target;

fn coverage() -> &'static Coverage {
    static COVERAGE: OnceLock<Coverage> = OnceLock::new();
    COVERAGE.get_or_init(|| {
        diffcov::coverage::parse_report(include_str!("../../fixtures/coverage.json")).unwrap()
    })
}

fuzz_target!(|data: &[u8]| {
    // Diff parser must not panic on any input.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = diffcov::diff::parse_diff(s, coverage());
    }
});
