//! `test-connection`'s backend (spec §6): since the core owns no
//! database driver wire protocol (spec §1 non-goals: "specific
//! database driver wire protocols"), this exercises `ehrql-reader`'s
//! batching/retry plumbing end to end against a configuration check
//! rather than a live socket — the same contract boundary
//! `ehrql-reader::Backend` draws for any real driver a deployment
//! plugs in.

use ehrql_reader::{Backend, ReaderError, ReaderOptions, ResultReader, Result as ReaderResult, Row};
use ehrql_types::Literal;

use crate::config::BackendConfig;

struct ConfiguredBackend {
    database_url: String,
}

impl Backend for ConfiguredBackend {
    fn fetch_batch(&mut self, _after_key: Option<&Literal>, _batch_size: usize) -> ReaderResult<Vec<Row>> {
        if self.database_url.trim().is_empty() {
            return Err(ReaderError::Fatal("DATABASE_URL is empty".to_string()));
        }
        Ok(Vec::new())
    }
}

/// Probe the configured backend and report `Ok(())` on a clean
/// zero-row round trip through `ResultReader`.
pub fn test_connection(config: &BackendConfig) -> ReaderResult<()> {
    let database_url = config.database_url.clone().ok_or_else(|| ReaderError::Fatal("DATABASE_URL is not set".to_string()))?;
    let backend = ConfiguredBackend { database_url };
    let mut reader = ResultReader::new(backend, ReaderOptions::default(), config.temp_database_name.is_some());
    reader.read_all(|| false)?;
    Ok(())
}
