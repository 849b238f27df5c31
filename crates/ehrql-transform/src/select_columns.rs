//! "Attach selected columns to row-picks" (spec §4.4): for every
//! `PickOneRowPerPatient`, record the set of column names ever projected
//! off it directly, so the lowerer knows which columns the sort/partition
//! subquery must carry through.

use std::collections::{BTreeSet, HashMap, HashSet};

use ehrql_builder::{Dataset, Result};
use ehrql_model::{Node, NodeRef, Position};

use crate::pipeline::TransformStep;
use crate::rewrite::{NodeRewriter, children, ptr_key, rewrite};

type SelectedColumns = HashMap<usize, BTreeSet<String>>;

/// Walk every node reachable from `roots`, recording which column names
/// are projected directly off each `PickOneRowPerPatient` encountered.
fn collect_selected_columns(roots: &[NodeRef]) -> SelectedColumns {
    let mut selected = SelectedColumns::new();
    let mut visited = HashSet::new();
    for root in roots {
        walk(root, &mut visited, &mut selected);
    }
    selected
}

fn walk(node: &NodeRef, visited: &mut HashSet<usize>, selected: &mut SelectedColumns) {
    if !visited.insert(ptr_key(node)) {
        return;
    }
    if let Node::SelectColumn { source, name } = node.as_ref() {
        if matches!(source.as_ref(), Node::PickOneRowPerPatient { .. }) {
            selected.entry(ptr_key(source)).or_default().insert(name.clone());
        }
    }
    for child in children(node.as_ref()) {
        walk(child, visited, selected);
    }
}

struct AttachRewriter<'a> {
    selected: &'a SelectedColumns,
}

impl NodeRewriter for AttachRewriter<'_> {
    fn rewrite_pick(&mut self, original: &NodeRef, source: NodeRef, position: Position) -> Result<NodeRef> {
        let columns = self.selected.get(&ptr_key(original)).cloned().unwrap_or_default();
        Ok(Node::with_selected_columns(source, position, columns))
    }
}

/// Rebuilds every `PickOneRowPerPatient` in the dataset's graphs with its
/// `selected_columns` populated.
pub struct AttachSelectedColumnsStep;

impl TransformStep for AttachSelectedColumnsStep {
    fn step_name(&self) -> &str {
        "attach_selected_columns"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut roots: Vec<NodeRef> = dataset.variables().iter().map(|(_, node)| node.clone()).collect();
        roots.push(dataset.population()?.clone());

        let selected = collect_selected_columns(&roots);
        let mut rewriter = AttachRewriter { selected: &selected };
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
    use ehrql_builder::{EventFrame, IntT, Series};
    use ehrql_types::{Column, Primitive, TableSchema};

    fn events_schema() -> TableSchema {
        TableSchema::new(
            "events",
            vec![
                Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
                Column::new("value", Primitive::Int, vec![]).unwrap(),
                Column::new("code", Primitive::Int, vec![]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn columns_selected_off_a_pick_are_recorded_on_it() {
        let events = EventFrame::from_table("events", events_schema());
        let value: Series<IntT> = events.column("value").unwrap();
        let picked = events.sort_by(&value).unwrap().first_for_patient().unwrap();
        let code: Series<IntT> = picked.column("code").unwrap();

        let mut dataset = Dataset::new();
        dataset.define_variable("code", || Ok(code.clone())).unwrap();
        dataset.set_population(|| Ok(Series::literal(true))).unwrap();

        let transformed = AttachSelectedColumnsStep.apply(&dataset).unwrap();
        let (_, rebuilt_code) = &transformed.variables()[0];
        let Node::SelectColumn { source, .. } = rebuilt_code.as_ref() else {
            panic!("expected a SelectColumn");
        };
        let Node::PickOneRowPerPatient { selected_columns, .. } = source.as_ref() else {
            panic!("expected a PickOneRowPerPatient");
        };
        assert!(selected_columns.contains("code"));
    }
}
