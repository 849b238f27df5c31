//! Where a [`crate::TableRegistry`] gets its schemas from.

use std::collections::BTreeMap;

use ehrql_types::TableSchema;

use crate::error::{RegistryError, Result};

/// A backend-agnostic source of table schemas, looked up by name.
///
/// Concrete backends (outside this core) implement this against whatever
/// catalog they actually have — a live database's information_schema, a
/// checked-in manifest file, a test fixture. The core only ever needs
/// [`schema_for`].
///
/// [`schema_for`]: SchemaSource::schema_for
pub trait SchemaSource {
    /// Resolve a single table's schema, or [`RegistryError::UnknownTable`]
    /// if this source has no entry for `name`.
    fn schema_for(&self, name: &str) -> Result<TableSchema>;
}

/// A [`SchemaSource`] backed by an in-memory JSON document: a top-level
/// object mapping table name to a serialized [`TableSchema`].
#[derive(Debug, Clone)]
pub struct JsonSchemaSource {
    schemas: BTreeMap<String, TableSchema>,
}

impl JsonSchemaSource {
    /// Parse a JSON manifest of `{ table_name: TableSchema }`.
    pub fn parse(json: &str) -> Result<Self> {
        let schemas: BTreeMap<String, TableSchema> =
            serde_json::from_str(json).map_err(|e| RegistryError::Malformed(e.to_string()))?;
        Ok(Self { schemas })
    }
}

impl SchemaSource for JsonSchemaSource {
    fn schema_for(&self, name: &str) -> Result<TableSchema> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_schema_manifest() {
        let json = r#"{
            "patients": {
                "name": "patients",
                "columns": [
                    {"name": "patient_id", "primitive": "int", "constraints": []}
                ]
            }
        }"#;
        let source = JsonSchemaSource::parse(json).unwrap();
        let schema = source.schema_for("patients").unwrap();
        assert_eq!(schema.columns().len(), 1);
    }

    #[test]
    fn missing_table_is_unknown() {
        let source = JsonSchemaSource::parse("{}").unwrap();
        assert!(matches!(source.schema_for("nope"), Err(RegistryError::UnknownTable(_))));
    }
}
