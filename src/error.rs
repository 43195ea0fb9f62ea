use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot read run state file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("run state file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write run state file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("request to upstream source failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream response is malformed: {0}")]
    Malformed(String),
}

/// Auth and Schema are fatal.  Connectivity is eligible for a bounded retry
/// by the orchestrator.  Other is a fatal catch-all for failures that match
/// none of the classification patterns.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection failed: {0}")]
    Connectivity(String),
    #[error("target table or schema mismatch: {0}")]
    Schema(String),
    #[error("load failed: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("failed to write artifact: {0}")]
    Artifact(#[from] std::io::Error),
    #[error("warehouse load failed after {attempts} attempt(s): {source}")]
    Load { attempts: u32, source: LoadError },
}
