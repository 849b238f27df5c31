//! The batched, key-ordered, retrying fetch loop (spec §4.8).

use crate::backend::{Backend, Row};
use crate::error::{ReaderError, Result};
use crate::options::ReaderOptions;

/// Reads a results table in deterministic key order, retrying
/// transient backend failures with exponential backoff.
pub struct ResultReader<B: Backend> {
    backend: B,
    options: ReaderOptions,
    /// Whether the staging table outlives a single connection. Per
    /// spec §4.8, reconnect-on-error is only valid when this is true —
    /// the staging table was already created by earlier setup queries
    /// regardless of which batch is being fetched, so a session-scoped
    /// temp table is exactly as unsafe to reconnect against on the
    /// first batch as on any later one.
    persistent_staging: bool,
}

impl<B: Backend> ResultReader<B> {
    pub fn new(backend: B, options: ReaderOptions, persistent_staging: bool) -> Self {
        Self { backend, options, persistent_staging }
    }

    /// Read every row, checking `cancelled` between batches. Returns
    /// whatever was read so far the moment `cancelled` returns `true`.
    pub fn read_all(&mut self, cancelled: impl Fn() -> bool) -> Result<Vec<Row>> {
        let mut all_rows = Vec::new();
        let mut after_key = None;

        loop {
            if cancelled() {
                break;
            }
            let batch = self.fetch_with_retry(after_key.as_ref())?;
            let batch_len = batch.len();
            if let Some(last) = batch.last() {
                after_key = last.key().cloned();
            }
            all_rows.extend(batch);
            if batch_len < self.options.batch_size {
                break;
            }
        }
        Ok(all_rows)
    }

    fn fetch_with_retry(&mut self, after_key: Option<&ehrql_types::Literal>) -> Result<Vec<Row>> {
        let mut attempt = 0;
        loop {
            match self.backend.fetch_batch(after_key, self.options.batch_size) {
                Ok(rows) => return Ok(rows),
                Err(err) => {
                    let retryable = matches!(err, ReaderError::Retryable(_)) && self.persistent_staging;
                    if !retryable {
                        return Err(ReaderError::Fatal(err.to_string()));
                    }
                    attempt += 1;
                    if attempt > self.options.max_retries {
                        return Err(err);
                    }
                    let backoff = self.options.backoff_for_attempt(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "retrying batch fetch");
                    std::thread::sleep(backoff);
                    self.backend.reconnect()?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrql_types::Literal;
    use std::cell::RefCell;
    use std::time::Duration;

    struct FakeBackend {
        pages: RefCell<Vec<Vec<Row>>>,
        fail_once: RefCell<bool>,
    }

    impl Backend for FakeBackend {
        fn fetch_batch(&mut self, _after_key: Option<&Literal>, _batch_size: usize) -> Result<Vec<Row>> {
            if *self.fail_once.borrow() {
                *self.fail_once.borrow_mut() = false;
                return Err(ReaderError::Retryable("connection reset".into()));
            }
            Ok(self.pages.borrow_mut().pop().unwrap_or_default())
        }
    }

    fn row(patient_id: i64) -> Row {
        Row::new(vec![Some(Literal::Int(patient_id))])
    }

    #[test]
    fn reads_every_batch_until_a_short_batch_ends_iteration() {
        let backend = FakeBackend {
            pages: RefCell::new(vec![vec![row(3)], vec![row(1), row(2)]]),
            fail_once: RefCell::new(false),
        };
        let options = ReaderOptions::default().with_batch_size(2);
        let mut reader = ResultReader::new(backend, options, false);
        let rows = reader.read_all(|| false).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn a_retryable_first_batch_error_is_fatal_when_staging_is_not_persistent() {
        let backend = FakeBackend {
            pages: RefCell::new(vec![vec![row(1)]]),
            fail_once: RefCell::new(true),
        };
        let options = ReaderOptions::default().with_batch_size(2).with_retry_sleep(Duration::from_millis(1));
        let mut reader = ResultReader::new(backend, options, false);
        let error = reader.read_all(|| false).unwrap_err();
        assert!(matches!(error, ReaderError::Fatal(_)));
    }

    #[test]
    fn a_retryable_first_batch_error_is_retried_when_staging_is_persistent() {
        let backend = FakeBackend {
            pages: RefCell::new(vec![vec![row(1)]]),
            fail_once: RefCell::new(true),
        };
        let options = ReaderOptions::default().with_batch_size(2).with_retry_sleep(Duration::from_millis(1));
        let mut reader = ResultReader::new(backend, options, true);
        let rows = reader.read_all(|| false).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn cancellation_stops_iteration_before_the_next_batch() {
        let backend = FakeBackend { pages: RefCell::new(vec![vec![row(1)], vec![row(2)]]), fail_once: RefCell::new(false) };
        let options = ReaderOptions::default().with_batch_size(1);
        let mut reader = ResultReader::new(backend, options, false);
        let rows = reader.read_all(|| true).unwrap();
        assert!(rows.is_empty());
    }
}
