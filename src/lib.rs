pub mod aggregate;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod diff;
pub mod error;
pub mod github;
pub mod groups;
pub mod model;
pub mod report;
