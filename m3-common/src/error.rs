use std::sync::Arc;

use thiserror::Error;

/// Failure to turn a single raw record into a fetchable. Never aborts the
/// resolution of sibling records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("record {record}: missing required property '{field}'")]
    MissingRequiredField { record: String, field: &'static str },

    #[error("record {record}: unsupported hash algorithm '{algorithm}'")]
    UnsupportedAlgorithm { record: String, algorithm: String },

    #[error("record {record}: '{field}' value '{value}' cannot be part of a filename")]
    InvalidField {
        record: String,
        field: &'static str,
        value: String,
    },

    #[error("mod '{name}': identifier '{identifier}' is neither a file id nor a download URL")]
    InvalidIdentifier { name: String, identifier: String },

    #[error("mod '{0}': not enough data to resolve, need one of 'curse', 'url'")]
    InsufficientSpecification(String),
}

impl ResolutionError {
    /// Attaches the record label to errors raised below the record level,
    /// such as checksum parsing.
    pub fn for_record(self, label: &str) -> Self {
        match self {
            ResolutionError::UnsupportedAlgorithm { algorithm, .. } => {
                ResolutionError::UnsupportedAlgorithm {
                    record: label.to_string(),
                    algorithm,
                }
            }
            other => other,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum M3Error {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Resolution Error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    DownloadError(String, String, String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("IoError: {0}")]
    IoError(String),

    #[error("Failed to execute command: {0}")]
    CommandExecError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for M3Error {
    fn from(err: std::io::Error) -> Self {
        M3Error::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for M3Error {
    fn from(err: reqwest::Error) -> Self {
        M3Error::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for M3Error {
    fn from(err: serde_json::Error) -> Self {
        M3Error::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, M3Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_error_names_its_record() {
        let err = ResolutionError::UnsupportedAlgorithm {
            record: String::new(),
            algorithm: "whirlpool".into(),
        }
        .for_record("jei");
        assert_eq!(
            err.to_string(),
            "record jei: unsupported hash algorithm 'whirlpool'"
        );
    }
}
