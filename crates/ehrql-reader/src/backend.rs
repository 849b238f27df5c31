//! The seam between the reader's batching/retry loop and a live SQL
//! connection (spec §6: "backend driver").

use ehrql_types::Literal;

use crate::error::Result;

/// A single row of the results table. `patient_id` (or whichever column
/// is configured as the key) is always first (spec §5 ordering
/// guarantees).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Option<Literal>>,
}

impl Row {
    pub fn new(values: Vec<Option<Literal>>) -> Self {
        Self { values }
    }

    /// The key column's value, used to page to the next batch.
    pub fn key(&self) -> Option<&Literal> {
        self.values.first().and_then(|v| v.as_ref())
    }
}

/// What the reader needs from a connection: fetch the next page in key
/// order, and reconnect after a retryable failure.
pub trait Backend {
    /// `SELECT ... WHERE key > after_key ORDER BY key LIMIT batch_size`
    /// (or, when `after_key` is `None`, the same query without the
    /// `WHERE` clause).
    fn fetch_batch(&mut self, after_key: Option<&Literal>, batch_size: usize) -> Result<Vec<Row>>;

    /// Reconnect after a retryable error. The default does nothing,
    /// for backends (e.g. the in-memory test double) with no
    /// connection state to refresh.
    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}
