//! The on-disk shape a dataset definition is read from (spec §6
//! "serialization"): the core does not parse a user's Python/DSL
//! source (spec §1 non-goals), so the CLI's entry point is the QM
//! graph's own stable JSON shape, already produced by a collaborator
//! upstream of this pipeline.

use std::path::Path;

use ehrql_builder::Dataset;
use ehrql_model::NodeRef;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// A population predicate plus an ordered set of named variables,
/// exactly what `ehrql_builder::Dataset` holds once built — this is
/// its serializable twin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub population: NodeRef,
    pub variables: Vec<(String, NodeRef)>,
}

impl Definition {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io { path: path.display().to_string(), source })?;
        serde_json::from_str(&text).map_err(|source| CliError::DefinitionLoad { path: path.display().to_string(), source })
    }

    /// Rebuild a [`Dataset`] from a loaded definition, bypassing the
    /// builder's rebinding checks — this graph already passed them
    /// once, at whatever earlier point produced the JSON.
    pub fn into_dataset(self) -> Dataset {
        Dataset::from_parts(self.variables, Some(self.population))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrql_model::Node;
    use ehrql_types::Literal;

    #[test]
    fn round_trips_through_json() {
        let definition = Definition {
            population: Node::value_scalar(Literal::Bool(true)),
            variables: vec![("age".to_string(), Node::value_scalar(Literal::Int(42)))],
        };
        let text = serde_json::to_string(&definition).unwrap();
        let reloaded: Definition = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded.variables.len(), 1);
    }
}
