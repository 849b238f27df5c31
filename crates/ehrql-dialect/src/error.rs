//! Dialect-level failure modes (spec §7 item 8).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialectError {
    #[error("date {0} is out of range for this backend's date literal format")]
    DateOutOfRange(chrono::NaiveDate),

    #[error("inline table {name} has {rows} rows, exceeding this backend's {limit}-row VALUES() limit")]
    InlineTableTooLarge { name: String, rows: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, DialectError>;
