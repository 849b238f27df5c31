//! Query Model error taxonomy.
//!
//! Each variant names a *category* of spec §7 error ("type mismatch",
//! "domain mismatch", "schema mismatch", "population invalid"), and carries
//! enough of the offending operands for the surface builder to render a
//! source-level message.

use thiserror::Error;

use ehrql_types::TypeSpec;

use crate::domain::Domain;

/// Errors raised while constructing or validating a Query Model node.
///
/// These propagate out of construction (spec §7 item 1-4); they are never
/// retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// An operand's type does not satisfy the operator's type
    /// specification.
    #[error("type mismatch in {operator}: expected {expected}, got {actual} (operand: {operand})")]
    TypeMismatch {
        /// The operator (node kind) being constructed.
        operator: &'static str,
        /// The expected type specification.
        expected: String,
        /// The actual runtime type found.
        actual: String,
        /// A debug representation of the offending operand.
        operand: String,
    },

    /// Two series could not be combined because their domains are
    /// incompatible (spec §3 invariant: "equal or one is the patient
    /// domain").
    #[error("domain mismatch in {operator}: {left} is not compatible with {right}")]
    DomainMismatch {
        /// The operator (node kind) being constructed.
        operator: &'static str,
        /// The left operand's domain.
        left: Domain,
        /// The right operand's domain.
        right: Domain,
    },

    /// A referenced table or column name is not present in the active
    /// schema.
    #[error("unknown {kind} {name:?}")]
    SchemaMismatch {
        /// `"table"` or `"column"`.
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// A literal value did not fit the constraint the operator requires of
    /// it (e.g. an `In`-set of codes spanning more than one code system).
    #[error("{0}")]
    InvalidLiteral(String),

    /// `PickOneRowPerPatient`'s source was not a `Sort` node (spec §3
    /// invariant 4).
    #[error("PickOneRowPerPatient requires a Sort as its immediate source")]
    PickRequiresSort,

    /// A `Case` expression's branches or default did not share a common
    /// type.
    #[error("Case branches must share a common type: {0}")]
    CaseTypeMismatch(String),

    /// The `population` variable failed validation (spec §7 item 4):
    /// not a patient-domain bool series, or dependent on an unrestricted
    /// aggregation.
    #[error("invalid population: {0}")]
    InvalidPopulation(String),

    /// Propagated from [`ehrql_types`] (invalid code, invalid name, ...).
    #[error(transparent)]
    Types(#[from] ehrql_types::TypesError),
}

impl ModelError {
    /// Build a [`ModelError::TypeMismatch`] from a target [`TypeSpec`] and
    /// the operand that failed to match it.
    pub fn type_mismatch(operator: &'static str, expected: &TypeSpec, actual: &TypeSpec, operand: impl std::fmt::Debug) -> Self {
        Self::TypeMismatch {
            operator,
            expected: expected.to_string(),
            actual: actual.to_string(),
            operand: format!("{operand:?}"),
        }
    }
}

/// Result alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
