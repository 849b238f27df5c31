//! Batch size / retry tuning, mirroring the shape of a streaming
//! reader's options struct: one `Default` plus `with_*` builders.

use std::time::Duration;

/// Tuning for the batched fetch loop (spec §4.8).
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Rows requested per `SELECT ... LIMIT`. A batch shorter than this
    /// ends iteration.
    pub batch_size: usize,
    /// Maximum retry attempts per batch before giving up.
    pub max_retries: u32,
    /// Base sleep before the first retry.
    pub retry_sleep: Duration,
    /// Multiplier applied to `retry_sleep` for each subsequent retry.
    pub backoff_factor: f64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { batch_size: 32_000, max_retries: 3, retry_sleep: Duration::from_millis(500), backoff_factor: 2.0 }
    }
}

impl ReaderOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_sleep(mut self, retry_sleep: Duration) -> Self {
        self.retry_sleep = retry_sleep;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// The sleep before the `n`th retry (1-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_sleep.mul_f64(self.backoff_factor.powi(i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX)))
    }
}
