use std::io;
use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use crate::range::ContentRangeError;

/// Errors that abort the whole job before any slice worker starts.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("server does not support ranged requests: {0}")]
    UnsupportedRange(#[from] ContentRangeError),

    #[error("probe request failed: {0}")]
    Probe(#[source] reqwest::Error),

    #[error("download cancelled")]
    Cancelled,

    #[error("failed to prepare destination: {0}")]
    Io(#[from] io::Error),
}

/// Why a single slice did not finish. Cloneable so the same failure can be
/// delivered as an event and kept in the outcome list.
#[derive(Debug, Clone, Error)]
pub enum SliceFailure {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("server answered {0} instead of 206 Partial Content")]
    UnexpectedStatus(StatusCode),

    #[error("stream ended after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },

    #[error("cancelled")]
    Cancelled,

    /// The worker task panicked before reporting.
    #[error("worker aborted: {0}")]
    Aborted(String),
}

impl From<io::Error> for SliceFailure {
    fn from(err: io::Error) -> Self {
        SliceFailure::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for SliceFailure {
    fn from(err: reqwest::Error) -> Self {
        SliceFailure::Network(Arc::new(err))
    }
}

impl SliceFailure {
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            SliceFailure::Network(_) | SliceFailure::UnexpectedStatus(_) | SliceFailure::Incomplete { .. }
        )
    }
}
