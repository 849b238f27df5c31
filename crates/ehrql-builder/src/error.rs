//! Builder error taxonomy.
//!
//! Wraps [`ModelError`] with the variable-name context the surface adds
//! when binding a dataset entry — spec §7 item 1, "friendly error
//! rewriting": a construction failure deep inside an expression should
//! surface which dataset variable it happened under, on top of the
//! operand repr [`ModelError`] already carries.

use thiserror::Error;

use ehrql_model::ModelError;

/// Errors raised while composing the surface (frames, series, dataset).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuilderError {
    /// A Query Model construction failed (type mismatch, domain
    /// mismatch, bad literal, ...).
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A series was required to be patient-domain (a dataset variable,
    /// or the population) but was not.
    #[error("{name:?} must be a patient-domain series")]
    NotPatientDomain {
        /// The dataset variable (or `"population"`) in question.
        name: String,
    },

    /// A dataset variable name was bound twice (spec §4.3: "reassignment
    /// is forbidden once a name is bound").
    #[error("variable {name:?} is already bound and cannot be reassigned")]
    AlreadyBound {
        /// The name that was already bound.
        name: String,
    },

    /// `population` was set more than once.
    #[error("population is already set and cannot be reassigned")]
    PopulationAlreadySet,

    /// The dataset was used (e.g. compiled) before `population` was set.
    #[error("dataset has no population defined")]
    MissingPopulation,

    /// An error annotated with the dataset variable it occurred under.
    #[error("in variable {name:?}: {source}")]
    InVariable {
        /// The variable name.
        name: String,
        /// The underlying error.
        #[source]
        source: Box<BuilderError>,
    },
}

impl BuilderError {
    /// Annotate this error with the dataset variable name it occurred
    /// under.
    pub fn in_variable(self, name: impl Into<String>) -> Self {
        Self::InVariable {
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// Result alias using [`BuilderError`].
pub type Result<T> = std::result::Result<T, BuilderError>;
