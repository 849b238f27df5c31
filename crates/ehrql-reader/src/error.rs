//! Reader failure modes (spec §7 items 6-7).

use thiserror::Error;

/// A backend failure, classified so the reader knows whether to retry.
#[derive(Debug, Error, Clone)]
pub enum ReaderError {
    /// Worth another attempt after backoff (a transient network blip, a
    /// lock timeout).
    #[error("retryable backend error: {0}")]
    Retryable(String),
    /// Not worth retrying (a syntax error, a permissions failure, or
    /// any error encountered while the staging table is not
    /// persistent).
    #[error("fatal backend error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, ReaderError>;
