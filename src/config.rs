//! Runtime configuration, read from the environment the way GitHub
//! Actions passes it: every setting is a string variable, empty meaning
//! unset.

use std::path::PathBuf;

use crate::error::{DiffcovError, Result};
use crate::github::AnnotationType;

/// Default for `MAX_FILES_IN_COMMENT`.
pub const DEFAULT_MAX_FILES: usize = 25;

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub github_repository: String,
    pub github_ref: Option<String>,
    pub github_base_ref: Option<String>,
    pub github_pr_number: Option<u64>,
    pub coverage_path: PathBuf,
    pub subproject_id: Option<String>,
    pub annotate_missing_lines: bool,
    pub annotation_type: AnnotationType,
    pub annotations_output_path: Option<PathBuf>,
    pub skip_coverage: bool,
    pub max_files_in_comment: usize,
    pub debug: bool,
}

impl Config {
    /// Build a configuration from the process environment
    /// (`GITHUB_TOKEN` and `GITHUB_REPOSITORY` are required).
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // GitHub Actions sets unused inputs to "": treat empty as unset.
        let get = |name: &str| var(name).filter(|value| !value.is_empty());
        let require = |name: &str| {
            get(name).ok_or_else(|| {
                DiffcovError::Config(format!("{name} environment variable is required"))
            })
        };

        let github_pr_number = match get("GITHUB_PR_NUMBER") {
            Some(value) => Some(value.parse::<u64>().map_err(|_| {
                DiffcovError::Config(format!("GITHUB_PR_NUMBER is not a number: {value}"))
            })?),
            None => None,
        };
        let annotation_type = match get("ANNOTATION_TYPE") {
            Some(value) => value.parse()?,
            None => AnnotationType::Warning,
        };
        let max_files_in_comment = match get("MAX_FILES_IN_COMMENT") {
            Some(value) => value.parse::<usize>().map_err(|_| {
                DiffcovError::Config(format!("MAX_FILES_IN_COMMENT is not a number: {value}"))
            })?,
            None => DEFAULT_MAX_FILES,
        };

        Ok(Self {
            github_token: require("GITHUB_TOKEN")?,
            github_repository: require("GITHUB_REPOSITORY")?,
            github_ref: get("GITHUB_REF"),
            github_base_ref: get("GITHUB_BASE_REF"),
            github_pr_number,
            coverage_path: get("COVERAGE_PATH")
                .map_or_else(|| PathBuf::from("coverage.json"), PathBuf::from),
            subproject_id: get("SUBPROJECT_ID"),
            annotate_missing_lines: get("ANNOTATE_MISSING_LINES")
                .is_some_and(|value| parse_bool(&value)),
            annotation_type,
            annotations_output_path: get("ANNOTATIONS_OUTPUT_PATH").map(PathBuf::from),
            skip_coverage: get("SKIP_COVERAGE").is_some_and(|value| parse_bool(&value)),
            max_files_in_comment,
            debug: get("DEBUG").is_some_and(|value| parse_bool(&value)),
        })
    }
}

/// Read a boolean flag from the environment (`1`, `true` or `yes`,
/// case-insensitive).
#[must_use]
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| parse_bool(&value))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn config_from(entries: &[(&str, &str)]) -> Result<Config> {
        let vars = vars(entries);
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[
            ("GITHUB_TOKEN", "t0ken"),
            ("GITHUB_REPOSITORY", "acme/rocket"),
        ])
        .unwrap();

        assert_eq!(config.github_token, "t0ken");
        assert_eq!(config.github_repository, "acme/rocket");
        assert_eq!(config.coverage_path, PathBuf::from("coverage.json"));
        assert_eq!(config.github_pr_number, None);
        assert_eq!(config.annotation_type, AnnotationType::Warning);
        assert_eq!(config.max_files_in_comment, DEFAULT_MAX_FILES);
        assert!(!config.annotate_missing_lines);
        assert!(!config.skip_coverage);
        assert!(!config.debug);
    }

    #[test]
    fn test_missing_token() {
        let err = config_from(&[("GITHUB_REPOSITORY", "acme/rocket")]).unwrap_err();
        assert!(matches!(err, DiffcovError::Config(_)));
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_empty_string_is_unset() {
        let err = config_from(&[
            ("GITHUB_TOKEN", ""),
            ("GITHUB_REPOSITORY", "acme/rocket"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_full_configuration() {
        let config = config_from(&[
            ("GITHUB_TOKEN", "t0ken"),
            ("GITHUB_REPOSITORY", "acme/rocket"),
            ("GITHUB_REF", "refs/pull/7/merge"),
            ("GITHUB_BASE_REF", "main"),
            ("GITHUB_PR_NUMBER", "7"),
            ("COVERAGE_PATH", "build/coverage.json"),
            ("SUBPROJECT_ID", "backend"),
            ("ANNOTATE_MISSING_LINES", "true"),
            ("ANNOTATION_TYPE", "error"),
            ("ANNOTATIONS_OUTPUT_PATH", "annotations.json"),
            ("SKIP_COVERAGE", "YES"),
            ("MAX_FILES_IN_COMMENT", "10"),
            ("DEBUG", "1"),
        ])
        .unwrap();

        assert_eq!(config.github_ref.as_deref(), Some("refs/pull/7/merge"));
        assert_eq!(config.github_base_ref.as_deref(), Some("main"));
        assert_eq!(config.github_pr_number, Some(7));
        assert_eq!(config.coverage_path, PathBuf::from("build/coverage.json"));
        assert_eq!(config.subproject_id.as_deref(), Some("backend"));
        assert!(config.annotate_missing_lines);
        assert_eq!(config.annotation_type, AnnotationType::Error);
        assert_eq!(
            config.annotations_output_path,
            Some(PathBuf::from("annotations.json"))
        );
        assert!(config.skip_coverage);
        assert_eq!(config.max_files_in_comment, 10);
        assert!(config.debug);
    }

    #[test]
    fn test_invalid_pr_number() {
        let err = config_from(&[
            ("GITHUB_TOKEN", "t0ken"),
            ("GITHUB_REPOSITORY", "acme/rocket"),
            ("GITHUB_PR_NUMBER", "seven"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_PR_NUMBER"));
    }

    #[test]
    fn test_invalid_annotation_type() {
        let err = config_from(&[
            ("GITHUB_TOKEN", "t0ken"),
            ("GITHUB_REPOSITORY", "acme/rocket"),
            ("ANNOTATION_TYPE", "loud"),
        ])
        .unwrap_err();
        assert!(matches!(err, DiffcovError::Config(_)));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("True"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("on"));
    }
}
