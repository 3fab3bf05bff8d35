use std::path::PathBuf;

use thiserror::Error;

/// Everything the profiler core can fail with.
#[derive(Error, Debug)]
pub enum Error {
    #[error("access log I/O failed on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse access log at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: DecodeError,
    },

    #[error("failed to compile aggregation pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Why a single durable-log line could not be turned back into an observation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing {0} label")]
    MissingLabel(&'static str),

    #[error("column {0:?} is not a label:value pair")]
    MalformedField(String),

    #[error("invalid {label} value {value:?}")]
    InvalidNumber { label: &'static str, value: String },

    #[error("invalid accessed_at timestamp {value:?}")]
    InvalidTimestamp { value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures caused by the caller's input rather than the log file.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Pattern { .. })
    }
}
