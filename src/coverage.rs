//! Loader for JSON line-coverage reports.
//!
//! The expected format is the machine-readable JSON report produced by
//! Python's `coverage json`, trimmed here to the parts we consume:
//!
//! ```json
//! {
//!     "meta": {
//!         "version": "7.4.0",
//!         "timestamp": "2024-05-10T12:00:00.123456",
//!         "branch_coverage": true,
//!         "show_contexts": false
//!     },
//!     "files": {
//!         "src/app.py": {
//!             "executed_lines": [1, 2, 5],
//!             "missing_lines": [7, 9],
//!             "excluded_lines": [],
//!             "summary": {
//!                 "covered_lines": 3,
//!                 "num_statements": 5,
//!                 "percent_covered": 60.0,
//!                 "percent_covered_display": "60",
//!                 "missing_lines": 2,
//!                 "excluded_lines": 0,
//!                 "num_branches": 2,
//!                 "num_partial_branches": 1,
//!                 "covered_branches": 1,
//!                 "missing_branches": 1
//!             }
//!         }
//!     },
//!     "totals": { "covered_lines": 3, "num_statements": 5, ... }
//! }
//! ```
//!
//! The four branch counts are optional as a unit: a report either carries
//! all of them or none. Deserialization happens into raw mirror structs so
//! every structural requirement is checked here, at the boundary; the rest
//! of the crate only ever sees a well-formed [`Coverage`].

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::error;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{DiffcovError, Result};
use crate::model::{BranchInfo, Coverage, CoverageInfo, CoverageMetadata, FileCoverage};

#[derive(Debug, Deserialize)]
struct RawReport {
    meta: RawMeta,
    files: IndexMap<String, RawFile>,
    totals: RawSummary,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    version: String,
    timestamp: String,
    branch_coverage: bool,
    show_contexts: bool,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    executed_lines: BTreeSet<u32>,
    missing_lines: BTreeSet<u32>,
    excluded_lines: BTreeSet<u32>,
    summary: RawSummary,
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    covered_lines: u64,
    num_statements: u64,
    percent_covered: Decimal,
    percent_covered_display: String,
    missing_lines: u64,
    excluded_lines: u64,
    num_branches: Option<u64>,
    num_partial_branches: Option<u64>,
    covered_branches: Option<u64>,
    missing_branches: Option<u64>,
}

impl RawSummary {
    fn into_info(self, scope: &str) -> Result<CoverageInfo> {
        let branches = match (
            self.num_branches,
            self.num_partial_branches,
            self.covered_branches,
            self.missing_branches,
        ) {
            (None, None, None, None) => None,
            (
                Some(num_branches),
                Some(num_partial_branches),
                Some(covered_branches),
                Some(missing_branches),
            ) => Some(BranchInfo {
                num_branches,
                num_partial_branches,
                covered_branches,
                missing_branches,
            }),
            _ => {
                return Err(DiffcovError::MalformedReport(format!(
                    "{scope}: branch fields must be present together or not at all"
                )))
            }
        };

        Ok(CoverageInfo {
            covered_lines: self.covered_lines,
            num_statements: self.num_statements,
            percent_covered: self.percent_covered,
            percent_covered_display: self.percent_covered_display,
            missing_lines: self.missing_lines,
            excluded_lines: self.excluded_lines,
            branches,
        })
    }
}

/// Parse a JSON coverage report.
pub fn parse_report(input: &str) -> Result<Coverage> {
    let raw: RawReport =
        serde_json::from_str(input).map_err(|e| DiffcovError::MalformedReport(e.to_string()))?;

    let timestamp = raw.meta.timestamp.parse::<NaiveDateTime>().map_err(|e| {
        DiffcovError::MalformedReport(format!(
            "invalid meta.timestamp {:?}: {e}",
            raw.meta.timestamp
        ))
    })?;
    let meta = CoverageMetadata {
        version: raw.meta.version,
        timestamp,
        branch_coverage: raw.meta.branch_coverage,
        show_contexts: raw.meta.show_contexts,
    };

    let mut files = IndexMap::with_capacity(raw.files.len());
    for (path, file) in raw.files {
        let info = file.summary.into_info(&path)?;
        files.insert(
            path.clone(),
            FileCoverage {
                path,
                executed_lines: file.executed_lines,
                missing_lines: file.missing_lines,
                excluded_lines: file.excluded_lines,
                info,
            },
        );
    }

    Ok(Coverage {
        meta,
        info: raw.totals.into_info("totals")?,
        files,
    })
}

/// Load and parse a coverage report from disk.
pub fn load_coverage(path: &Path) -> Result<Coverage> {
    let input = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            error!("Coverage report file not found: {}", path.display());
            DiffcovError::NotFound(path.display().to_string())
        } else {
            DiffcovError::Io(e)
        }
    })?;
    parse_report(&input).map_err(|e| {
        error!("Coverage report file {} is invalid", path.display());
        e
    })
}
