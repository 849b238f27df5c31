//! Registry error taxonomy.

use thiserror::Error;

/// Errors raised while loading or querying the table-schema registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// A requested table name has no known schema (spec §6: "unknown names
    /// cause a compile-time error").
    #[error("unknown table {0:?}")]
    UnknownTable(String),

    /// The schema source could not be parsed (malformed JSON manifest etc.).
    #[error("failed to load table schema manifest: {0}")]
    Malformed(String),

    /// Two entries in the source declared the same table name.
    #[error("duplicate table {0:?} in schema source")]
    DuplicateTable(String),
}

/// Result alias using [`RegistryError`].
pub type Result<T> = std::result::Result<T, RegistryError>;
