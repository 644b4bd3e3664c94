use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read reference file {path}: {source}")]
    ReferenceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse reference file {path}: {source}")]
    ReferenceJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a submitted report was rejected. Rejections are logged and dropped,
/// never reported back to the submitter.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no summary object")]
    MissingSummary,

    #[error("payload has no by_party list")]
    MissingParties,

    #[error("payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}
