//! The dataset under construction: an ordered variable→series mapping
//! plus a distinguished `population` entry (spec §4.3, §7 item 4).

use ehrql_model::NodeRef;

use crate::error::{BuilderError, Result};
use crate::series::{BoolT, ElementType, Series};

/// An ordered set of patient-domain variables plus a population
/// predicate, ready to hand to `ehrql-transform`/`ehrql-sql`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: Vec<(String, NodeRef)>,
    population: Option<NodeRef>,
}

impl Dataset {
    /// An empty dataset with no variables and no population.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a patient-domain series to a variable name, built lazily by
    /// `build` so that any [`crate::error::BuilderError`] raised while
    /// constructing it is annotated with this variable's name (spec §7
    /// item 1: "friendly error rewriting").
    ///
    /// Reassignment is forbidden: a name already bound is an error
    /// (spec §4.3), even if `build` would otherwise succeed.
    pub fn define_variable<T: ElementType>(
        &mut self,
        name: impl Into<String>,
        build: impl FnOnce() -> Result<Series<T>>,
    ) -> Result<()> {
        let name = name.into();
        if self.variables.iter().any(|(bound, _)| bound == &name) {
            return Err(BuilderError::AlreadyBound { name });
        }
        let series = build().map_err(|err| err.in_variable(&name))?;
        if !series.node().domain().is_patient() {
            return Err(BuilderError::NotPatientDomain { name });
        }
        self.variables.push((name, series.node().clone()));
        Ok(())
    }

    /// Set the dataset's population, the patient-domain bool predicate
    /// selecting which patients appear in the output. May only be set
    /// once.
    ///
    /// Spec §7 item 4 also names a second "population invalid" failure
    /// mode — depending on an unrestricted aggregation of an unrelated
    /// event table — that this does not check; see DESIGN.md for why
    /// domain-is-patient is the only check enforced here.
    pub fn set_population(&mut self, build: impl FnOnce() -> Result<Series<BoolT>>) -> Result<()> {
        if self.population.is_some() {
            return Err(BuilderError::PopulationAlreadySet);
        }
        let series = build().map_err(|err| err.in_variable("population"))?;
        if !series.node().domain().is_patient() {
            return Err(BuilderError::NotPatientDomain { name: "population".to_string() });
        }
        self.population = Some(series.node().clone());
        Ok(())
    }

    /// The population predicate, or an error if it has not been set yet.
    pub fn population(&self) -> Result<&NodeRef> {
        self.population.as_ref().ok_or(BuilderError::MissingPopulation)
    }

    /// Every bound variable, in binding order.
    pub fn variables(&self) -> &[(String, NodeRef)] {
        &self.variables
    }

    /// Rebuild a dataset from already-validated variable/population
    /// nodes, bypassing `define_variable`/`set_population`'s
    /// rebinding checks.
    ///
    /// Used by `ehrql-transform`'s rebuild passes (spec §4.4), which
    /// deep-clone a validated dataset's graph and must reassemble the
    /// result without re-running domain/name checks that already
    /// passed against the original.
    pub fn from_parts(variables: Vec<(String, NodeRef)>, population: Option<NodeRef>) -> Self {
        Self { variables, population }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::IntT;

    #[test]
    fn reassigning_a_variable_is_rejected() {
        let mut dataset = Dataset::new();
        dataset.define_variable("age", || Ok(Series::<IntT>::literal(42))).unwrap();
        let err = dataset.define_variable("age", || Ok(Series::<IntT>::literal(1))).unwrap_err();
        assert!(matches!(err, BuilderError::AlreadyBound { .. }));
    }

    #[test]
    fn population_cannot_be_set_twice() {
        let mut dataset = Dataset::new();
        dataset.set_population(|| Ok(Series::<BoolT>::literal(true))).unwrap();
        let err = dataset.set_population(|| Ok(Series::<BoolT>::literal(false))).unwrap_err();
        assert!(matches!(err, BuilderError::PopulationAlreadySet));
    }

    #[test]
    fn missing_population_is_a_typed_error() {
        let dataset = Dataset::new();
        assert!(matches!(dataset.population(), Err(BuilderError::MissingPopulation)));
    }

    #[test]
    fn build_errors_are_annotated_with_the_variable_name() {
        let mut dataset = Dataset::new();
        let err = dataset
            .define_variable("smallest", || crate::series::minimum_of::<IntT>(std::iter::empty()))
            .unwrap_err();
        assert!(matches!(err, BuilderError::InVariable { ref name, .. } if name == "smallest"));
    }
}
