//! Lowering failure modes (spec §7 item 8).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("{0} is not a row-set-shaped node and cannot be used as a FROM source")]
    NotAFrame(&'static str),

    #[error("{0} is not a patient-domain scalar expression")]
    NotPatientScalar(&'static str),

    /// The population predicate (or a standalone variable) referenced no
    /// table at all, so there is no frame to anchor the final query's
    /// `FROM` clause on (spec §4.5: every dataset has at least one
    /// table-backed predicate).
    #[error("population does not reference any table, so there is no patient_id source to anchor the query on")]
    EmptyPopulation,

    /// Reference-evaluator-only: a `SelectTable`/`SelectPatientTable`
    /// named a table the [`crate::reference::TestData`] fixture never
    /// registered.
    #[error("no fixture data registered for table {0:?}")]
    UnknownTable(String),

    /// Reference-evaluator-only: an operand's runtime value didn't
    /// match what `op` requires (e.g. `StringContains` over a
    /// non-`Str` literal) — the typed builder API should make this
    /// unreachable in practice, but the interpreter checks anyway
    /// since it works from untyped [`crate::reference::Value`]s.
    #[error("{op} received an unexpected value: {value}")]
    TypeMismatch { op: &'static str, value: String },

    #[error(transparent)]
    Dialect(#[from] ehrql_dialect::DialectError),

    #[error(transparent)]
    Builder(#[from] ehrql_builder::BuilderError),
}

pub type Result<T> = std::result::Result<T, SqlError>;
