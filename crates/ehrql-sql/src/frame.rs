//! Lowers row-set-shaped (frame) nodes to a SQL FROM source: source
//! tables, inline tables, and the `Filter`/`Sort` chain wrapped around
//! them. `PickOneRowPerPatient` and `AggregateByPatient` collapse to
//! the patient domain and are handled in `pick.rs`/`expr.rs` instead,
//! since their result is consumed as a join, not a bare frame.

use ehrql_dialect::InlineTablePlacement;
use ehrql_model::{Node, NodeRef};

use crate::ctx::{Frame, LowerCtx};
use crate::error::{Result, SqlError};
use crate::expr::lower_expr;

pub(crate) fn lower_frame(node: &NodeRef, ctx: &mut LowerCtx) -> Result<Frame> {
    if let Some(cached) = ctx.cached_frame(node) {
        return Ok(cached);
    }
    let frame = build_frame(node, ctx)?;
    Ok(ctx.cache_frame(node, frame))
}

fn build_frame(node: &NodeRef, ctx: &mut LowerCtx) -> Result<Frame> {
    match node.as_ref() {
        Node::SelectTable { name, .. } | Node::SelectPatientTable { name, .. } => {
            Ok(Frame { from_sql: ctx.dialect.quote_ident(name), alias: name.clone() })
        }
        Node::InlinePatientTable { rows, schema } => {
            let alias = ctx.fresh_alias("inline");
            let columns: Vec<&str> = schema.columns().iter().map(|c| c.name()).collect();
            match ctx.dialect.inline_patient_table(&alias, &columns, rows)? {
                InlineTablePlacement::Values(values_expr) => {
                    Ok(Frame { from_sql: format!("(SELECT * FROM {values_expr})"), alias })
                }
                InlineTablePlacement::TempTable { from_expr, setup_queries, cleanup_queries } => {
                    let mut table = ehrql_scheduler::TempTable::new(alias.clone());
                    for query in setup_queries {
                        table = table.with_setup(query);
                    }
                    for query in cleanup_queries {
                        table = table.with_cleanup(query);
                    }
                    ctx.temp_tables.push(table);
                    Ok(Frame { from_sql: from_expr, alias })
                }
            }
        }
        Node::Filter { source, condition } => {
            let source_frame = lower_frame(source, ctx)?;
            let condition_sql = lower_expr(condition, ctx)?;
            let alias = ctx.fresh_alias("filtered");
            Ok(Frame {
                from_sql: format!(
                    "(SELECT * FROM {} AS {} WHERE {})",
                    source_frame.from_sql,
                    source_frame.alias,
                    condition_sql.render()
                ),
                alias,
            })
        }
        // A bare `Sort` carries no rows of its own; its sort key is
        // read by whichever `PickOneRowPerPatient` sits on top of it
        // (spec §4.5: "sorts accumulate into the `ORDER BY` of a
        // window function").
        Node::Sort { source, .. } => lower_frame(source, ctx),
        other => Err(SqlError::NotAFrame(other.kind_name())),
    }
}
