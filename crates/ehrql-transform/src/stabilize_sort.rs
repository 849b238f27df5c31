//! "Stabilize sort order" (spec §4.4): for every row-pick, add one new
//! sort key per selected column not already used as a direct column sort
//! key, underneath the existing chain, in lexicographic order of name —
//! so picks are deterministic across backends even when user sorts tie.
//! Boolean sort columns are wrapped in a `Case` mapping
//! `{true -> 2, false -> 1, null -> 0}`, since some backends cannot sort
//! booleans directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ehrql_builder::{Dataset, Result};
use ehrql_model::{Node, NodeRef, Position, function};
use ehrql_model::{Function as _, FunctionBuilder};
use ehrql_types::{Literal, Primitive, TypeSpec};

use crate::pipeline::TransformStep;
use crate::rewrite::{NodeRewriter, rewrite};

struct StabilizeRewriter;

impl NodeRewriter for StabilizeRewriter {
    fn rewrite_pick(&mut self, original: &NodeRef, source: NodeRef, position: Position) -> Result<NodeRef> {
        let Node::PickOneRowPerPatient { selected_columns, .. } = original.as_ref() else {
            unreachable!("rewrite() only calls rewrite_pick for PickOneRowPerPatient");
        };
        let stabilized = stabilize_chain(&source, selected_columns)?;
        Ok(Node::with_selected_columns(stabilized, position, selected_columns.clone()))
    }
}

/// Insert the missing stabilizing sort keys underneath `chain`'s
/// existing `Sort` wrappers.
fn stabilize_chain(chain: &NodeRef, selected: &BTreeSet<String>) -> Result<NodeRef> {
    let (layers, base) = split_sort_chain(chain);
    let existing: BTreeSet<String> = layers
        .iter()
        .filter_map(|(sort_by, _)| match sort_by.as_ref() {
            Node::SelectColumn { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();

    // Stack in reverse lexicographic order so the alphabetically-first
    // name ends up outermost among the new keys (highest priority,
    // adjacent to the pre-existing chain reapplied below), and each
    // later name is pushed further toward `base` (lower priority).
    let mut current = base;
    for name in selected.iter().rev().filter(|name| !existing.contains(name.as_str())) {
        let column = Node::select_column(current.clone(), name.clone())?;
        let key = stabilize_bool_sort_key(column)?;
        current = Node::sort(current, key)?;
    }

    // Reapply the pre-existing keys, innermost first, fixing up each
    // one's reference to its old immediate source (the chain node it
    // was originally stacked on) to point at the new intermediate chain.
    for (sort_by, old_source) in layers.into_iter().rev() {
        let fixed_sort_by = substitute(&sort_by, &old_source, &current)?;
        current = Node::sort(current, fixed_sort_by)?;
    }

    Ok(current)
}

/// Unwrap a `Sort` chain into its keys (outermost first) paired with the
/// node each was originally stacked on, plus the non-`Sort` base.
fn split_sort_chain(chain: &NodeRef) -> (Vec<(NodeRef, NodeRef)>, NodeRef) {
    let mut layers = Vec::new();
    let mut current = chain.clone();
    loop {
        let Node::Sort { source, sort_by } = current.as_ref() else {
            break;
        };
        layers.push((sort_by.clone(), source.clone()));
        current = source.clone();
    }
    (layers, current)
}

fn stabilize_bool_sort_key(column: NodeRef) -> Result<NodeRef> {
    if column.result_type() != TypeSpec::Primitive(Primitive::Bool) {
        return Ok(column);
    }
    let when_true = function(FunctionBuilder::Eq(column.clone(), Node::value_scalar(Literal::Bool(true))))?;
    let when_false = function(FunctionBuilder::Eq(column, Node::value_scalar(Literal::Bool(false))))?;
    let cases = vec![(when_true, Node::value_scalar(Literal::Int(2))), (when_false, Node::value_scalar(Literal::Int(1)))];
    Ok(Node::case(cases, Some(Node::value_scalar(Literal::Int(0))))?)
}

struct SubstituteRewriter<'a> {
    from: &'a NodeRef,
    to: &'a NodeRef,
}

impl NodeRewriter for SubstituteRewriter<'_> {
    fn rewrite_pick(&mut self, original: &NodeRef, source: NodeRef, position: Position) -> Result<NodeRef> {
        let Node::PickOneRowPerPatient { selected_columns, .. } = original.as_ref() else {
            unreachable!("rewrite() only calls rewrite_pick for PickOneRowPerPatient");
        };
        Ok(Node::with_selected_columns(source, position, selected_columns.clone()))
    }

    fn shortcut(&mut self, node: &NodeRef) -> Option<NodeRef> {
        Arc::ptr_eq(node, self.from).then(|| self.to.clone())
    }
}

/// Replace every occurrence of `from` (by pointer identity) in `node`
/// with `to`, rebuilding everything structurally above it.
fn substitute(node: &NodeRef, from: &NodeRef, to: &NodeRef) -> Result<NodeRef> {
    let mut memo = HashMap::new();
    let mut rewriter = SubstituteRewriter { from, to };
    rewrite(node, &mut memo, &mut rewriter)
}

/// Rebuilds every row-pick's sort chain with stabilizing keys inserted.
pub struct StabilizeSortOrderStep;

impl TransformStep for StabilizeSortOrderStep {
    fn step_name(&self) -> &str {
        "stabilize_sort_order"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut rewriter = StabilizeRewriter;
        let mut memo = HashMap::new();

        let variables = dataset
            .variables()
            .iter()
            .map(|(name, node)| Ok((name.clone(), rewrite(node, &mut memo, &mut rewriter)?)))
            .collect::<Result<Vec<_>>>()?;
        let population = rewrite(dataset.population()?, &mut memo, &mut rewriter)?;

        Ok(Dataset::from_parts(variables, Some(population)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select_columns::AttachSelectedColumnsStep;
    use ehrql_builder::{BoolT, EventFrame, IntT, Series};
    use ehrql_types::{Column, Primitive, TableSchema};

    fn events_schema() -> TableSchema {
        TableSchema::new(
            "events",
            vec![
                Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
                Column::new("date", Primitive::Int, vec![]).unwrap(),
                Column::new("value", Primitive::Int, vec![]).unwrap(),
                Column::new("is_primary", Primitive::Bool, vec![]).unwrap(),
                Column::new("code", Primitive::Int, vec![]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn a_selected_column_not_already_sorted_gets_a_new_sort_key() {
        let events = EventFrame::from_table("events", events_schema());
        let value: Series<IntT> = events.column("value").unwrap();
        let picked = events.sort_by(&value).unwrap().first_for_patient().unwrap();
        let code: Series<IntT> = picked.column("code").unwrap();

        let mut dataset = Dataset::new();
        dataset.define_variable("code", || Ok(code.clone())).unwrap();
        dataset.set_population(|| Ok(Series::literal(true))).unwrap();

        let attached = AttachSelectedColumnsStep.apply(&dataset).unwrap();
        let stabilized = StabilizeSortOrderStep.apply(&attached).unwrap();

        let (_, rebuilt_code) = &stabilized.variables()[0];
        let Node::SelectColumn { source: pick, .. } = rebuilt_code.as_ref() else {
            panic!("expected a SelectColumn");
        };
        let Node::PickOneRowPerPatient { source: chain, .. } = pick.as_ref() else {
            panic!("expected a PickOneRowPerPatient");
        };
        let (layers, _) = split_sort_chain(chain);
        let names: Vec<&String> = layers
            .iter()
            .filter_map(|(sort_by, _)| match sort_by.as_ref() {
                Node::SelectColumn { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert!(names.contains(&&"code".to_string()));
        assert!(names.contains(&&"value".to_string()));
    }

    #[test]
    fn boolean_sort_columns_are_wrapped_in_a_case() {
        let events = EventFrame::from_table("events", events_schema());
        let value: Series<IntT> = events.column("value").unwrap();
        let picked = events.sort_by(&value).unwrap().first_for_patient().unwrap();
        let _: Series<BoolT> = picked.column("is_primary").unwrap();
        let code: Series<IntT> = picked.column("code").unwrap();

        let mut dataset = Dataset::new();
        dataset.define_variable("code", || Ok(code.clone())).unwrap();
        dataset.define_variable("is_primary", || picked.column::<BoolT>("is_primary")).unwrap();
        dataset.set_population(|| Ok(Series::literal(true))).unwrap();

        let attached = AttachSelectedColumnsStep.apply(&dataset).unwrap();
        let stabilized = StabilizeSortOrderStep.apply(&attached).unwrap();

        let (_, rebuilt) = stabilized.variables().iter().find(|(name, _)| name == "is_primary").unwrap();
        let Node::SelectColumn { source: pick, .. } = rebuilt.as_ref() else {
            panic!("expected a SelectColumn");
        };
        let Node::PickOneRowPerPatient { source: chain, .. } = pick.as_ref() else {
            panic!("expected a PickOneRowPerPatient");
        };
        let (layers, _) = split_sort_chain(chain);
        let has_case_key = layers.iter().any(|(sort_by, _)| matches!(sort_by.as_ref(), Node::Case { .. }));
        assert!(has_case_key, "boolean sort key should be wrapped in a Case");
    }

    #[test]
    fn new_sort_keys_stack_with_the_alphabetically_first_column_outermost() {
        let events = EventFrame::from_table("events", events_schema());
        let date: Series<IntT> = events.column("date").unwrap();
        let picked = events.sort_by(&date).unwrap().first_for_patient().unwrap();
        let code: Series<IntT> = picked.column("code").unwrap();
        let value: Series<IntT> = picked.column("value").unwrap();

        let mut dataset = Dataset::new();
        dataset.define_variable("code", || Ok(code.clone())).unwrap();
        dataset.define_variable("value", || Ok(value.clone())).unwrap();
        dataset.set_population(|| Ok(Series::literal(true))).unwrap();

        let attached = AttachSelectedColumnsStep.apply(&dataset).unwrap();
        let stabilized = StabilizeSortOrderStep.apply(&attached).unwrap();

        let (_, rebuilt_code) = stabilized.variables().iter().find(|(name, _)| name == "code").unwrap();
        let Node::SelectColumn { source: pick, .. } = rebuilt_code.as_ref() else {
            panic!("expected a SelectColumn");
        };
        let Node::PickOneRowPerPatient { source: chain, .. } = pick.as_ref() else {
            panic!("expected a PickOneRowPerPatient");
        };
        let (layers, _) = split_sort_chain(chain);
        let names: Vec<&String> = layers
            .iter()
            .filter_map(|(sort_by, _)| match sort_by.as_ref() {
                Node::SelectColumn { name, .. } => Some(name),
                _ => None,
            })
            .collect();

        // Outermost first: the user's explicit "date" sort stays on top,
        // then "code" (alphabetically first) immediately below it
        // outranking "value" — matching a patient tied on "date" with
        // (code='B', value=20) and (code='A', value=10) picking the
        // code='A' row, not the smaller-value row.
        assert_eq!(names, vec![&"date".to_string(), &"code".to_string(), &"value".to_string()]);
    }
}
