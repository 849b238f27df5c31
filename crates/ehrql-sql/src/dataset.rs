//! Final assembly (spec §4.5 "Assembly"): lowers a whole dataset's
//! population and variables against one shared [`LowerCtx`] so a
//! subexpression shared by two variables (the same `Arc`-identical
//! node — e.g. both reading off the same `PickOneRowPerPatient`) joins
//! in only once, then wraps the accumulated temp tables in a
//! [`ehrql_scheduler::ExecutionPlan`].

use ehrql_builder::Dataset;
use ehrql_dialect::Dialect;
use ehrql_scheduler::{ExecutionPlan, plan};

use crate::ctx::LowerCtx;
use crate::error::{Result, SqlError};
use crate::expr::lower_expr;
use crate::ir::CompiledVariable;

/// A single dataset variable compiled on its own, for ad hoc
/// inspection (the `dump-dataset-sql` CLI path dumps one of these per
/// variable rather than the combined dataset query).
pub fn lower_variable(name: &str, node: &ehrql_model::NodeRef, dialect: &dyn Dialect) -> Result<(CompiledVariable, Vec<ehrql_scheduler::TempTable>)> {
    let mut ctx = LowerCtx::new(dialect);
    let expr = lower_expr(node, &mut ctx)?;
    Ok((CompiledVariable { name: name.to_string(), expr, joins: ctx.joins.clone() }, ctx.temp_tables))
}

/// The fully assembled dataset query plus the temp-table setup/cleanup
/// queries that must bracket it.
#[derive(Debug, Clone)]
pub struct LoweredDataset {
    pub main_query: String,
    pub setup_queries: Vec<String>,
    pub cleanup_queries: Vec<String>,
}

impl From<LoweredDataset> for ExecutionPlan {
    fn from(lowered: LoweredDataset) -> Self {
        ExecutionPlan {
            setup_queries: lowered.setup_queries,
            main_query: lowered.main_query,
            cleanup_queries: lowered.cleanup_queries,
        }
    }
}

/// Lower `dataset`'s population and every variable, and assemble the
/// combined query (spec §4.5): `FROM` the first table the population
/// predicate touches, `LEFT JOIN` every other dependency any variable
/// or the population itself needed, filtered by the population
/// predicate.
///
/// `dataset` is expected to already have passed through
/// `ehrql_transform::build_default_pipeline` — this crate lowers a
/// Query Model graph, it does not rewrite one.
pub fn lower_dataset(dataset: &Dataset, dialect: &dyn Dialect) -> Result<LoweredDataset> {
    let mut ctx = LowerCtx::new(dialect);

    let population_expr = lower_expr(dataset.population()?, &mut ctx)?;
    // The population predicate always touches at least one real table
    // (there is no QM node for "every patient who ever existed"), so
    // the first join it registers is the natural anchor for the whole
    // dataset's `FROM` clause.
    let anchor = ctx.joins.first().cloned().ok_or(SqlError::EmptyPopulation)?;

    let mut compiled_variables = Vec::with_capacity(dataset.variables().len());
    for (name, node) in dataset.variables() {
        let expr = lower_expr(node, &mut ctx)?;
        compiled_variables.push((name.clone(), expr));
    }

    let mut select_list = vec![format!("{}.patient_id", anchor.alias)];
    for (name, expr) in &compiled_variables {
        select_list.push(format!("{} AS {name}", expr.render()));
    }

    let mut main_query =
        format!("SELECT {} FROM {} AS {}", select_list.join(", "), anchor.from_sql, anchor.alias);
    for join in ctx.joins.iter().filter(|j| j.alias != anchor.alias) {
        main_query.push_str(&format!(
            " LEFT JOIN {} AS {} ON {}.patient_id = {}.patient_id",
            join.from_sql, join.alias, join.alias, anchor.alias
        ));
    }
    main_query.push_str(&format!(" WHERE {}", population_expr.render()));

    let execution_plan = plan(&ctx.temp_tables, main_query);
    Ok(LoweredDataset {
        main_query: execution_plan.main_query,
        setup_queries: execution_plan.setup_queries,
        cleanup_queries: execution_plan.cleanup_queries,
    })
}
