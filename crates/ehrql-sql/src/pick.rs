//! Lowers `PickOneRowPerPatient` to a `ROW_NUMBER()`-windowed subquery
//! (spec §4.5: "row-picks use `ROW_NUMBER() OVER (PARTITION BY
//! patient_id ORDER BY ...)` and select the row where `ROW_NUMBER = 1`
//! (LAST reverses direction)").

use std::collections::BTreeSet;

use ehrql_model::{Node, NodeRef, Position};

use crate::ctx::{Frame, LowerCtx};
use crate::error::Result;
use crate::expr::lower_expr;
use crate::frame::lower_frame;

/// Returns the join alias for `pick_node`'s windowed subquery, building
/// and registering it on first reference.
pub(crate) fn join_for_pick(pick_node: &NodeRef, ctx: &mut LowerCtx) -> Result<String> {
    if let Some(alias) = ctx.cached_join(pick_node) {
        return Ok(alias);
    }
    let Node::PickOneRowPerPatient { source, position, selected_columns } = pick_node.as_ref() else {
        unreachable!("join_for_pick is only called for a PickOneRowPerPatient node")
    };

    let (base, sort_keys) = collect_sort_keys(source, ctx)?;
    let base_frame = lower_frame(&base, ctx)?;

    let direction = match position {
        Position::First => "ASC",
        Position::Last => "DESC",
    };
    let order_by = sort_keys.iter().map(|key| format!("{} {direction}", key.render())).collect::<Vec<_>>().join(", ");

    // `patient_id` is always carried, plus every column the attach-
    // selected-columns transform recorded (spec §4.4).
    let mut columns: BTreeSet<String> = selected_columns.clone();
    columns.insert("patient_id".to_string());
    let column_list = columns.iter().map(|c| format!("{}.{c}", base_frame.alias)).collect::<Vec<_>>().join(", ");
    let unqualified_list = columns.iter().cloned().collect::<Vec<_>>().join(", ");

    let windowed = format!(
        "SELECT {column_list}, ROW_NUMBER() OVER (PARTITION BY {}.patient_id ORDER BY {order_by}) AS rn FROM {} AS {}",
        base_frame.alias, base_frame.from_sql, base_frame.alias
    );
    let picked = format!("(SELECT {unqualified_list} FROM ({windowed}) AS ranked WHERE rn = 1)");

    let alias = ctx.fresh_alias("picked");
    Ok(ctx.register_join(pick_node, Frame { from_sql: picked, alias }))
}

/// Walks a `Sort` chain outer-to-inner, lowering each sort key against
/// the exact node it was stacked onto (so it resolves against the same
/// memoized frame the base ultimately produces), and returns the chain's
/// base node plus the keys in priority order (outermost = highest
/// priority, matching `ORDER BY`'s left-to-right precedence).
fn collect_sort_keys(mut node: &NodeRef, ctx: &mut LowerCtx) -> Result<(NodeRef, Vec<crate::ir::SqlExpr>)> {
    let mut keys = Vec::new();
    loop {
        match node.as_ref() {
            Node::Sort { source, sort_by } => {
                keys.push(lower_expr(sort_by, ctx)?);
                node = source;
            }
            _ => return Ok((node.clone(), keys)),
        }
    }
}
