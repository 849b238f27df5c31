//! `ColumnSpec` inference (spec §4.9): each output column's name,
//! primitive type, nullability, and category promotion derived once
//! from a dataset's variables, independent of any one dialect — the
//! source of truth every output writer consumes.

use ehrql_model::{Aggregate, Function, Node, NodeRef};
use ehrql_types::{Literal, TypeSpec};

/// Per-column metadata a file writer needs for dictionary/category
/// encoding: the compiled type, whether nulls can occur, and any
/// categorical/range constraint promoted from the source schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub result_type: TypeSpec,
    pub nullable: bool,
    pub categories: Option<Vec<Literal>>,
    pub min_value: Option<Literal>,
    pub max_value: Option<Literal>,
}

/// Infer a [`ColumnSpec`] for a compiled variable's root node.
///
/// `left_joined_to_population` should be `true` for every dataset
/// variable (spec §4.5: "the final per-variable expression is left-
/// outer joined ... so absent rows yield nulls") and `false` only when
/// inferring for a sub-expression in isolation (e.g. a test against
/// the reference evaluator).
pub fn infer(node: &NodeRef, left_joined_to_population: bool) -> ColumnSpec {
    let (categories, min_value, max_value) = match node.as_ref() {
        Node::SelectColumn { source, name } => match originating_column(source, name) {
            Some(column) => (
                column.categories().map(<[Literal]>::to_vec),
                column.closed_range().map(|(min, _)| min.clone()),
                column.closed_range().map(|(_, max)| max.clone()),
            ),
            None => (None, None, None),
        },
        _ => (None, None, None),
    };

    ColumnSpec {
        result_type: node.result_type(),
        nullable: left_joined_to_population || injects_null(node),
        categories,
        min_value,
        max_value,
    }
}

/// Walk through column-preserving wrappers (`Filter`, `Sort`,
/// `PickOneRowPerPatient`) to the table schema `name` was ultimately
/// selected from, dropping the constraint the moment the chain passes
/// through anything that could transform the value.
fn originating_column<'a>(node: &'a Node, name: &str) -> Option<&'a ehrql_types::Column> {
    match node {
        Node::SelectTable { schema, .. } | Node::SelectPatientTable { schema, .. } | Node::InlinePatientTable { schema, .. } => {
            schema.column(name)
        }
        Node::Filter { source, .. } | Node::Sort { source, .. } => originating_column(source, name),
        Node::PickOneRowPerPatient { source, .. } => originating_column(source, name),
        _ => None,
    }
}

/// Whether this node's own construction can yield a null for a patient
/// who is otherwise present (spec §4.9: "whether any sub-path may
/// inject nulls").
fn injects_null(node: &Node) -> bool {
    match node {
        Node::Value(_) | Node::SelectTable { .. } | Node::SelectPatientTable { .. } | Node::InlinePatientTable { .. } => false,
        Node::SelectColumn { source, .. } => injects_null(source),
        Node::Filter { source, .. } | Node::Sort { source, .. } => injects_null(source),
        // An empty source (no events at all for this patient) yields a
        // null pick, independent of the sort chain beneath it.
        Node::PickOneRowPerPatient { .. } => true,
        Node::AggregateByPatient(agg) => match agg {
            Aggregate::Exists(_) | Aggregate::Count(_) => false,
            Aggregate::Min(_) | Aggregate::Max(_) | Aggregate::Sum(_) | Aggregate::Mean(_) | Aggregate::CombineAsSet(_) => true,
        },
        Node::Function(func) => match func {
            Function::TrueDivide(..) | Function::FloorDivide(..) => true,
            other => function_operands(other).into_iter().any(injects_null),
        },
        Node::Case { cases, default } => {
            default.is_none() || cases.iter().any(|(c, v)| injects_null(c) || injects_null(v))
        }
    }
}

fn function_operands(func: &Function) -> Vec<&Node> {
    match func {
        Function::Not(a)
        | Function::IsNull(a)
        | Function::Negate(a)
        | Function::YearFromDate(a)
        | Function::MonthFromDate(a)
        | Function::DayFromDate(a)
        | Function::ToFirstOfMonth(a)
        | Function::ToFirstOfYear(a)
        | Function::CastToInt(a)
        | Function::CastToFloat(a) => vec![a.as_ref()],
        Function::Eq(a, b)
        | Function::Ne(a, b)
        | Function::Lt(a, b)
        | Function::Le(a, b)
        | Function::Gt(a, b)
        | Function::Ge(a, b)
        | Function::And(a, b)
        | Function::Or(a, b)
        | Function::In(a, b)
        | Function::Add(a, b)
        | Function::Subtract(a, b)
        | Function::Multiply(a, b)
        | Function::TrueDivide(a, b)
        | Function::FloorDivide(a, b)
        | Function::StringContains(a, b)
        | Function::DateAddDays(a, b)
        | Function::DateAddMonths(a, b)
        | Function::DateAddYears(a, b)
        | Function::DateDifferenceInDays(a, b)
        | Function::DateDifferenceInMonths(a, b)
        | Function::DateDifferenceInYears(a, b) => vec![a.as_ref(), b.as_ref()],
        Function::MinimumOf(xs) | Function::MaximumOf(xs) => xs.iter().map(AsRef::as_ref).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrql_types::{Column, Constraint, Primitive, TableSchema};

    fn events_schema() -> TableSchema {
        TableSchema::new(
            "events",
            vec![
                Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
                Column::new(
                    "code",
                    Primitive::Str,
                    vec![Constraint::Categorical(vec![Literal::Str("A".into()), Literal::Str("B".into())])],
                )
                .unwrap(),
                Column::new(
                    "value",
                    Primitive::Int,
                    vec![Constraint::ClosedRange(Literal::Int(0), Literal::Int(100))],
                )
                .unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn categories_survive_a_sort_and_pick_chain() {
        let table = Node::select_table("events", events_schema());
        let code_sort_key = Node::select_column(table.clone(), "code").unwrap();
        let sorted = Node::sort(table, code_sort_key).unwrap();
        let picked = Node::pick_one_row_per_patient(sorted, ehrql_model::Position::First).unwrap();
        let final_code = Node::select_column(picked, "code").unwrap();

        let column_spec = infer(&final_code, false);
        assert_eq!(column_spec.categories, Some(vec![Literal::Str("A".into()), Literal::Str("B".into())]));
    }

    #[test]
    fn a_division_result_is_nullable_even_without_a_population_join() {
        let numerator = Node::value_scalar(Literal::Int(1));
        let denominator = Node::value_scalar(Literal::Int(0));
        let division = ehrql_model::function(ehrql_model::FunctionBuilder::TrueDivide(numerator, denominator)).unwrap();
        let column_spec = infer(&division, false);
        assert!(column_spec.nullable);
    }

    #[test]
    fn a_plain_literal_is_not_nullable_without_a_population_join() {
        let value = Node::value_scalar(Literal::Int(42));
        let column_spec = infer(&value, false);
        assert!(!column_spec.nullable);
    }

    #[test]
    fn every_dataset_variable_is_nullable_once_joined_to_population() {
        let value = Node::value_scalar(Literal::Int(42));
        let column_spec = infer(&value, true);
        assert!(column_spec.nullable);
    }
}
