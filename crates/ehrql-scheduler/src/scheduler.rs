//! Breadth-first depth tracking over the temp-table dependency graph
//! (spec §4.7), generalized from `domain_sets`'s lookup-map-building
//! shape and `dedupe`'s iterate-check-mutate loop.
//!
//! Each table records the maximum depth at which it is reachable from
//! any root; deeper tables are dependencies of shallower ones and must
//! be set up first. A table's setup queries may reference itself (a
//! self-join against its own prior state); that edge is dropped rather
//! than followed. General cycles are bounded by the table count so a
//! pathological dependency graph still terminates.

use std::collections::{BTreeMap, VecDeque};

use crate::temp_table::TempTable;

/// Every table's name, ordered deepest-first: tables with no
/// dependents come last, so setting up in this order guarantees every
/// dependency exists before its dependents.
pub fn schedule(tables: &[TempTable]) -> Vec<String> {
    let by_name: BTreeMap<&str, &TempTable> = tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut depth: BTreeMap<String, usize> = tables.iter().map(|t| (t.name.clone(), 0)).collect();
    let mut queue: VecDeque<(String, usize)> = tables.iter().map(|t| (t.name.clone(), 0)).collect();

    while let Some((name, d)) = queue.pop_front() {
        let Some(table) = by_name.get(name.as_str()) else {
            continue;
        };
        for dep in &table.depends_on {
            if dep == &name {
                continue;
            }
            let next_depth = d + 1;
            let should_relax = match depth.get(dep) {
                Some(existing) => *existing < next_depth,
                None => true,
            };
            if should_relax && next_depth <= tables.len() {
                depth.insert(dep.clone(), next_depth);
                queue.push_back((dep.clone(), next_depth));
            }
        }
    }

    let mut ordered: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
    ordered.sort_by_key(|name| std::cmp::Reverse(*depth.get(name).unwrap_or(&0)));
    ordered
}

/// The final query execution plan (spec §4.7): setup queries deepest-
/// first, the main results query, then cleanup in reverse setup order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub setup_queries: Vec<String>,
    pub main_query: String,
    pub cleanup_queries: Vec<String>,
}

/// Build the execution plan for `tables` against `main_query`.
pub fn plan(tables: &[TempTable], main_query: impl Into<String>) -> ExecutionPlan {
    let order = schedule(tables);
    let by_name: BTreeMap<&str, &TempTable> = tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let setup_queries =
        order.iter().filter_map(|name| by_name.get(name.as_str())).flat_map(|t| t.setup_queries.clone()).collect();
    let cleanup_queries = order
        .iter()
        .rev()
        .filter_map(|name| by_name.get(name.as_str()))
        .flat_map(|t| t.cleanup_queries.clone())
        .collect();

    tracing::debug!(tables = order.len(), "scheduled temp-table execution plan");
    ExecutionPlan { setup_queries, main_query: main_query.into(), cleanup_queries }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_dependency_is_set_up_before_its_dependent() {
        let tables = vec![
            TempTable::new("outer").with_setup("CREATE outer AS SELECT * FROM inner").depends_on("inner"),
            TempTable::new("inner").with_setup("CREATE inner AS SELECT * FROM events"),
        ];
        let order = schedule(&tables);
        let inner_pos = order.iter().position(|n| n == "inner").unwrap();
        let outer_pos = order.iter().position(|n| n == "outer").unwrap();
        assert!(inner_pos < outer_pos);
    }

    #[test]
    fn a_self_referencing_table_does_not_loop_forever() {
        let tables = vec![TempTable::new("recursive").with_setup("...").depends_on("recursive")];
        let order = schedule(&tables);
        assert_eq!(order, vec!["recursive".to_string()]);
    }

    #[test]
    fn cleanup_runs_in_reverse_of_setup_order() {
        let tables = vec![
            TempTable::new("outer").with_setup("s1").with_cleanup("c1").depends_on("inner"),
            TempTable::new("inner").with_setup("s2").with_cleanup("c2"),
        ];
        let plan = plan(&tables, "SELECT 1");
        assert_eq!(plan.setup_queries, vec!["s2".to_string(), "s1".to_string()]);
        assert_eq!(plan.cleanup_queries, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn a_two_table_cycle_still_terminates() {
        let tables = vec![
            TempTable::new("a").with_setup("sa").depends_on("b"),
            TempTable::new("b").with_setup("sb").depends_on("a"),
        ];
        let order = schedule(&tables);
        assert_eq!(order.len(), 2);
    }
}
