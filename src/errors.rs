use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions of a restore run. Any of these aborts the run before (or instead of)
/// dispatching objects; per-file handler failures are never turned into one of these.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Grafana API is unreachable: {0}")]
    ApiUnreachable(String),

    #[error("Grafana preflight check failed with status {status}: {body}")]
    Preflight { status: u16, body: String },

    #[error("Failed to fetch archive from remote storage: {0}")]
    ArchiveFetch(String),

    #[error("Archive {archive} is not a readable tar.gz archive: {reason}")]
    ArchiveUnreadable { archive: String, reason: String },

    #[error("Failed to extract archive into {}: {reason}", workspace.display())]
    Extraction { workspace: PathBuf, reason: String },

    #[error("Failed to create temporary workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("Unknown component(s): {} (expected any of: {expected})", names.join(", "))]
    UnknownComponent { names: Vec<String>, expected: String },

    #[error("Failed to scan extracted archive: {0}")]
    Selection(String),
}

pub type Result<T> = std::result::Result<T, RestoreError>;
