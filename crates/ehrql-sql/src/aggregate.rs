//! Lowers `AggregateByPatient.*` to a `GROUP BY patient_id` subquery
//! (spec §4.5 "Aggregations"), wrapped in a CTE first when the dialect
//! says `AVG`/`SUM` cannot see the source subquery directly.

use ehrql_model::{Aggregate, Node, NodeRef};
use ehrql_types::Literal;

use crate::ctx::{Frame, LowerCtx};
use crate::error::Result;
use crate::expr::lower_expr;
use crate::frame::lower_frame;
use crate::ir::SqlExpr;

fn agg_source(agg: &Aggregate) -> &NodeRef {
    match agg {
        Aggregate::Exists(s)
        | Aggregate::Count(s)
        | Aggregate::Min(s)
        | Aggregate::Max(s)
        | Aggregate::Sum(s)
        | Aggregate::Mean(s)
        | Aggregate::CombineAsSet(s) => s,
    }
}

/// The event-domain frame an aggregate's source column reads from, and
/// the value expression within it (`1` for a bare row-existence/count
/// reference that names no column).
fn event_source(node: &NodeRef, ctx: &mut LowerCtx) -> Result<(Frame, SqlExpr)> {
    match node.as_ref() {
        Node::SelectColumn { source, name } => {
            let frame = lower_frame(source, ctx)?;
            let column = SqlExpr::column(frame.alias.clone(), name);
            Ok((frame, column))
        }
        _ => {
            let frame = lower_frame(node, ctx)?;
            Ok((frame, SqlExpr::Raw("1".to_string())))
        }
    }
}

pub(crate) fn join_for_aggregate(node: &NodeRef, agg: &Aggregate, ctx: &mut LowerCtx) -> Result<String> {
    if let Some(alias) = ctx.cached_join(node) {
        return Ok(alias);
    }

    let (frame, value_expr) = event_source(agg_source(agg), ctx)?;
    let value_sql = value_expr.render();
    let agg_sql = match agg {
        Aggregate::Exists(_) => format!(
            "CASE WHEN COUNT(*) > 0 THEN {} ELSE {} END",
            ctx.dialect.literal_sql(&Literal::Bool(true))?,
            ctx.dialect.literal_sql(&Literal::Bool(false))?
        ),
        Aggregate::Count(_) => "COUNT(*)".to_string(),
        Aggregate::Min(_) => format!("MIN({value_sql})"),
        Aggregate::Max(_) => format!("MAX({value_sql})"),
        Aggregate::Sum(_) => format!("SUM({value_sql})"),
        Aggregate::Mean(_) => ctx.dialect.calculate_mean(&value_sql),
        Aggregate::CombineAsSet(_) => ctx.dialect.combine_as_set(&value_sql),
    };

    // MSSQL can't `GROUP BY`/`AVG` directly over an arbitrary derived
    // table in one step when that table itself came from a temp-table
    // placement; materializing it as a CTE first sidesteps that (spec
    // §4.5, `aggregate_needs_cte`). The CTE keeps `frame.alias` as its
    // own name so `value_sql` (already rendered against that alias)
    // still resolves without re-qualifying it.
    let source_sql = if ctx.dialect.aggregate_needs_cte() {
        format!(
            "(WITH {alias} AS (SELECT * FROM {from_sql} AS {alias}) \
             SELECT {alias}.patient_id, {agg_sql} AS agg_value FROM {alias} GROUP BY {alias}.patient_id)",
            alias = frame.alias,
            from_sql = frame.from_sql,
        )
    } else {
        format!(
            "(SELECT {alias}.patient_id, {agg_sql} AS agg_value FROM {from_sql} AS {alias} GROUP BY {alias}.patient_id)",
            alias = frame.alias,
            from_sql = frame.from_sql,
        )
    };

    let alias = ctx.fresh_alias("agg");
    Ok(ctx.register_join(node, Frame { from_sql: source_sql, alias }))
}
