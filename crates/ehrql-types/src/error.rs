//! Error types for the type system.

use thiserror::Error;

/// Errors raised by type matching, literal construction, and schema lookup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TypesError {
    /// A clinical code value did not satisfy its code system's format.
    #[error("invalid {system} code: {value:?}")]
    InvalidCode {
        /// The code system the value was validated against.
        system: &'static str,
        /// The offending raw value.
        value: String,
    },

    /// A table or column name was empty or blank.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// `get_typespec` was asked to derive a type for a heterogeneous
    /// collection (elements with different runtime types).
    #[error("heterogeneous collection: elements have mixed types ({0} vs {1})")]
    HeterogeneousCollection(&'static str, &'static str),

    /// `get_typespec` was asked to derive a type for an empty collection,
    /// which has no unambiguous element type.
    #[error("cannot derive a type for an empty collection")]
    EmptyCollection,
}

/// Result alias using [`TypesError`].
pub type Result<T> = std::result::Result<T, TypesError>;
