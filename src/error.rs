use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffcovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Coverage report not found: {0}")]
    NotFound(String),

    #[error("Malformed coverage report: {0}")]
    MalformedReport(String),

    #[error("Malformed diff: {0}")]
    MalformedDiff(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GitHub API error: {0}")]
    Http(String),

    #[error("Cannot get pull request: {0}")]
    CannotGetPullRequest(String),

    #[error("Cannot post comment: {0}")]
    CannotPostComment(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DiffcovError>;
