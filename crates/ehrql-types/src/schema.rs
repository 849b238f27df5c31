//! Table schemas: an ordered mapping from column name to [`Column`].
//!
//! Constraints are declarative metadata only — spec §3 is explicit that
//! they are "never enforced at query time"; they exist to be consumed by
//! column-spec inference and (outside the core) dummy-data generation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};
use crate::literal::Literal;
use crate::primitive::Primitive;

/// A declarative, non-enforced constraint on a column's values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constraint {
    /// Values may never be null.
    NotNull,
    /// Values are unique within the table.
    Unique,
    /// Values are drawn from a fixed category list.
    Categorical(Vec<Literal>),
    /// Date values fall on the first of the month.
    FirstOfMonth,
    /// String values must match a regular expression.
    Regex(String),
    /// Numeric/date values fall within `[min, max]` inclusive.
    ClosedRange(Literal, Literal),
}

/// A single column definition within a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    name: String,
    primitive: Primitive,
    constraints: Vec<Constraint>,
}

impl Column {
    /// Construct a column, rejecting a blank name.
    pub fn new(
        name: impl Into<String>,
        primitive: Primitive,
        constraints: Vec<Constraint>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TypesError::InvalidName(name));
        }
        Ok(Self {
            name,
            primitive,
            constraints,
        })
    }

    /// The column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column's primitive element type.
    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// The column's declarative constraints, in declaration order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Whether `NotNull` appears among this column's constraints.
    pub fn is_not_null(&self) -> bool {
        self.constraints.iter().any(|c| matches!(c, Constraint::NotNull))
    }

    /// The categorical value list, if this column declares one.
    pub fn categories(&self) -> Option<&[Literal]> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Categorical(values) => Some(values.as_slice()),
            _ => None,
        })
    }

    /// The closed range, if this column declares one.
    pub fn closed_range(&self) -> Option<(&Literal, &Literal)> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::ClosedRange(min, max) => Some((min, max)),
            _ => None,
        })
    }
}

/// An ordered mapping from column name to [`Column`], identifying a source
/// table's shape (spec §3 "Table schema").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    /// Construct a schema, rejecting a blank table name or duplicate column
    /// names.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TypesError::InvalidName(name));
        }
        let mut seen = std::collections::BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.name().to_ascii_uppercase()) {
                return Err(TypesError::InvalidName(format!(
                    "duplicate column {:?} in table {name:?}",
                    column.name()
                )));
            }
        }
        Ok(Self { name, columns })
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Whether this schema has a column named `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", column.name(), column.primitive())?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_columns() {
        let columns = vec![
            Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
            Column::new("PATIENT_ID", Primitive::Int, vec![]).unwrap(),
        ];
        assert!(TableSchema::new("patients", columns).is_err());
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let columns = vec![Column::new("dob", Primitive::Date, vec![Constraint::NotNull]).unwrap()];
        let schema = TableSchema::new("patients", columns).unwrap();
        assert!(schema.column("DOB").unwrap().is_not_null());
    }
}
