use hostweb_common::HostwebError;
use std::path::PathBuf;
use thiserror::Error;

use crate::tools::{LintMessage, ToolError};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Cannot find config (.hostwebrc) file in {0}")]
    MissingConfig(PathBuf),

    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Source directory not found: {0}")]
    MissingSource(PathBuf),

    #[error("API is enabled but no _hwapi entry file was found in {0}")]
    MissingApiEntry(PathBuf),

    #[error("Linting {entry} failed with {error_count} error(s)")]
    Lint {
        entry: PathBuf,
        error_count: usize,
        messages: Vec<LintMessage>,
    },

    #[error("Bundling failed: {0}")]
    Bundle(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Directory already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Directory is not empty: {0}")]
    NotEmpty(PathBuf),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pack(#[from] HostwebError),
}
