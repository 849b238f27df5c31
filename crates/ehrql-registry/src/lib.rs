#![deny(unsafe_code)]
//! The table-schema registry (spec §6): a thin, name-keyed lookup the core
//! consumes but does not own. A missing entry is a typed error rather than
//! a panic — the "table name -> schema" contract the query compiler
//! actually needs.

pub mod error;
pub mod source;

pub use error::{RegistryError, Result};
pub use source::{JsonSchemaSource, SchemaSource};

use std::collections::BTreeMap;

use ehrql_types::TableSchema;

/// A loaded, name-keyed set of table schemas.
///
/// Construction validates that the source has no duplicate names;
/// thereafter lookups are infallible pointer-chasing and only [`get`]'s
/// caller decides what an unknown name means (the core treats it as a
/// [`RegistryError::UnknownTable`] at QM construction time, via
/// `ehrql-model`).
///
/// [`get`]: TableRegistry::get
#[derive(Debug, Clone)]
pub struct TableRegistry {
    schemas: BTreeMap<String, TableSchema>,
}

impl TableRegistry {
    /// Load a registry from every schema a [`SchemaSource`] can produce for
    /// the given table names, rejecting duplicates.
    pub fn load(source: &dyn SchemaSource, names: &[&str]) -> Result<Self> {
        let mut schemas = BTreeMap::new();
        for &name in names {
            let schema = source.schema_for(name)?;
            if schemas.insert(name.to_string(), schema).is_some() {
                return Err(RegistryError::DuplicateTable(name.to_string()));
            }
        }
        Ok(Self { schemas })
    }

    /// Build a registry directly from an already-resolved schema map, e.g.
    /// for tests.
    pub fn from_schemas(schemas: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.name().to_string(), s)).collect(),
        }
    }

    /// Look up a table's schema by name.
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.schemas.get(name)
    }

    /// Look up a table's schema, or a [`RegistryError::UnknownTable`].
    pub fn require(&self, name: &str) -> Result<&TableSchema> {
        self.get(name).ok_or_else(|| RegistryError::UnknownTable(name.to_string()))
    }

    /// Every table name known to this registry, in sorted order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrql_types::{Column, Primitive};

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(name, vec![Column::new("patient_id", Primitive::Int, vec![]).unwrap()]).unwrap()
    }

    #[test]
    fn unknown_table_is_a_typed_error() {
        let registry = TableRegistry::from_schemas([schema("patients")]);
        assert!(matches!(registry.require("events"), Err(RegistryError::UnknownTable(_))));
    }

    #[test]
    fn known_table_resolves() {
        let registry = TableRegistry::from_schemas([schema("patients")]);
        assert_eq!(registry.require("patients").unwrap().name(), "patients");
    }
}
