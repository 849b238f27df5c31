//! Patient and event frames: the two row-granularities a table reference
//! can have (spec §3/§4.3).
//!
//! A [`PatientFrame`] carries at most one row per patient; an
//! [`EventFrame`] may carry many, and can be filtered, sorted, and
//! finally collapsed to a [`PatientFrame`] via
//! [`SortedEventFrame::first_for_patient`]/`last_for_patient`.

use ehrql_types::{Literal, TableSchema, TypeSpec};

use ehrql_model::{ModelError, Node, NodeRef, Position};

use crate::error::Result;
use crate::series::{BoolT, ElementType, Series};

fn typed_column<T: ElementType>(source: &NodeRef, schema: &TableSchema, name: &str) -> Result<Series<T>> {
    let column = schema
        .column(name)
        .ok_or_else(|| ModelError::SchemaMismatch { kind: "column", name: name.to_string() })?;
    if column.primitive() != T::PRIMITIVE {
        return Err(ModelError::type_mismatch(
            "SelectColumn",
            &TypeSpec::Primitive(T::PRIMITIVE),
            &TypeSpec::Primitive(column.primitive()),
            name,
        )
        .into());
    }
    let node = Node::select_column(source.clone(), name)?;
    Ok(Series::from_node(node))
}

/// A table reference carrying at most one row per patient.
#[derive(Debug, Clone)]
pub struct PatientFrame {
    node: NodeRef,
    schema: TableSchema,
}

impl PatientFrame {
    /// Reference a patient-domain source table.
    pub fn from_table(name: impl Into<String>, schema: TableSchema) -> Self {
        let node = Node::select_patient_table(name, schema.clone());
        Self { node, schema }
    }

    /// Build a literal, patient-domain inline table.
    pub fn from_inline_rows(rows: Vec<Vec<Literal>>, schema: TableSchema) -> Result<Self> {
        let node = Node::inline_patient_table(rows, schema.clone())?;
        Ok(Self { node, schema })
    }

    /// Project a typed column by name.
    pub fn column<T: ElementType>(&self, name: &str) -> Result<Series<T>> {
        typed_column(&self.node, &self.schema, name)
    }

    /// The underlying QM node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }
}

/// A table reference that may carry many rows per patient.
#[derive(Debug, Clone)]
pub struct EventFrame {
    node: NodeRef,
    schema: TableSchema,
}

impl EventFrame {
    /// Reference an event-domain source table.
    pub fn from_table(name: impl Into<String>, schema: TableSchema) -> Self {
        let node = Node::select_table(name, schema.clone());
        Self { node, schema }
    }

    /// Project a typed column by name.
    pub fn column<T: ElementType>(&self, name: &str) -> Result<Series<T>> {
        typed_column(&self.node, &self.schema, name)
    }

    /// Restrict rows to those matching `condition`.
    pub fn filter(&self, condition: &Series<BoolT>) -> Result<Self> {
        let node = Node::filter(self.node.clone(), condition.node().clone())?;
        Ok(Self { node, schema: self.schema.clone() })
    }

    /// Begin a sort chain on this frame, used by a later
    /// `first_for_patient`/`last_for_patient`.
    pub fn sort_by<T: ElementType>(&self, key: &Series<T>) -> Result<SortedEventFrame> {
        let node = Node::sort(self.node.clone(), key.node().clone())?;
        Ok(SortedEventFrame { node, schema: self.schema.clone() })
    }

    /// The underlying QM node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }
}

/// An [`EventFrame`] with at least one `Sort` applied.
#[derive(Debug, Clone)]
pub struct SortedEventFrame {
    node: NodeRef,
    schema: TableSchema,
}

impl SortedEventFrame {
    /// Project a typed column from the frame at its current sort depth.
    /// Used to derive the next key in a stacked sort, since a sort key's
    /// domain must match the exact chain node it is stacked onto (spec
    /// §3: "an event domain uniquely identified by the source table plus
    /// the chain of filters/sorts that produced it").
    pub fn column<T: ElementType>(&self, name: &str) -> Result<Series<T>> {
        typed_column(&self.node, &self.schema, name)
    }

    /// Stack another sort key on top of the existing chain, narrowing
    /// ties (spec §3).
    pub fn sort_by<T: ElementType>(&self, key: &Series<T>) -> Result<Self> {
        let node = Node::sort(self.node.clone(), key.node().clone())?;
        Ok(Self { node, schema: self.schema.clone() })
    }

    /// Collapse to the first row per patient under the current sort
    /// order.
    pub fn first_for_patient(&self) -> Result<PatientFrame> {
        let node = Node::pick_one_row_per_patient(self.node.clone(), Position::First)?;
        Ok(PatientFrame { node, schema: self.schema.clone() })
    }

    /// Collapse to the last row per patient under the current sort
    /// order.
    pub fn last_for_patient(&self) -> Result<PatientFrame> {
        let node = Node::pick_one_row_per_patient(self.node.clone(), Position::Last)?;
        Ok(PatientFrame { node, schema: self.schema.clone() })
    }

    /// The underlying QM node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::IntT;
    use ehrql_types::{Column, Primitive};

    fn events_schema() -> TableSchema {
        TableSchema::new(
            "events",
            vec![
                Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
                Column::new("value", Primitive::Int, vec![]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn first_for_patient_collapses_to_patient_domain() {
        let events = EventFrame::from_table("events", events_schema());
        let value: Series<IntT> = events.column("value").unwrap();
        let picked = events.sort_by(&value).unwrap().first_for_patient().unwrap();
        assert!(picked.node().domain().is_patient());
    }

    #[test]
    fn column_type_mismatch_is_a_typed_error() {
        let events = EventFrame::from_table("events", events_schema());
        let result: Result<Series<crate::series::StrT>> = events.column("value");
        assert!(result.is_err());
    }

    #[test]
    fn stacking_a_second_sort_key_reads_from_the_sorted_frame() {
        let events = EventFrame::from_table("events", events_schema());
        let value: Series<IntT> = events.column("value").unwrap();
        let sorted = events.sort_by(&value).unwrap();
        let patient_id: Series<IntT> = sorted.column("patient_id").unwrap();
        let picked = sorted.sort_by(&patient_id).unwrap().first_for_patient().unwrap();
        assert!(picked.node().domain().is_patient());
    }
}
