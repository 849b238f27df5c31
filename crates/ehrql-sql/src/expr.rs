//! Lowers scalar-shaped nodes (`Value`, `SelectColumn`, `Function`,
//! `Case`, `AggregateByPatient`) to a [`SqlExpr`], joining in whichever
//! row-set-shaped subquery the expression depends on.
//!
//! A single function handles every call site — a `Filter` condition, a
//! `Sort` key, a `Case` arm, or a dataset variable's root — because the
//! pointer-identity memo in [`LowerCtx`] guarantees a node always
//! resolves against the same frame/join no matter where in the fold it
//! is encountered (the same trick `ehrql-transform`'s rewrite engine
//! uses to keep a rebuild DAG-preserving).

use ehrql_model::{Aggregate, Function, Node, NodeRef, ValueLiteral};

use crate::ctx::LowerCtx;
use crate::error::{Result, SqlError};
use crate::frame::lower_frame;
use crate::ir::SqlExpr;
use crate::pick::join_for_pick;

pub(crate) fn lower_expr(node: &NodeRef, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    match node.as_ref() {
        Node::Value(ValueLiteral::Scalar(literal)) => Ok(SqlExpr::Raw(ctx.dialect.literal_sql(literal)?)),
        Node::Value(ValueLiteral::Set(set)) => {
            let items = set.iter().map(|literal| ctx.dialect.literal_sql(literal)).collect::<Result<Vec<_>>>()?;
            Ok(SqlExpr::Raw(format!("({})", items.join(", "))))
        }
        Node::SelectColumn { source, name } => lower_select_column(source, name, ctx),
        Node::AggregateByPatient(agg) => lower_aggregate(node, agg, ctx),
        Node::Function(func) => lower_function(func, ctx),
        Node::Case { cases, default } => lower_case(cases, default, ctx),
        other => Err(SqlError::NotPatientScalar(other.kind_name())),
    }
}

fn lower_select_column(source: &NodeRef, name: &str, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    match source.as_ref() {
        // A column taken straight off a pick resolves through the
        // pick's windowed subquery, joined in like any other
        // patient-scalar source.
        Node::PickOneRowPerPatient { .. } => {
            let alias = join_for_pick(source, ctx)?;
            Ok(SqlExpr::column(alias, name))
        }
        // A column taken straight off a patient table or inline table
        // (no pick in between) is itself already patient domain and
        // must be joined in.
        Node::SelectPatientTable { .. } | Node::InlinePatientTable { .. } => {
            let frame = lower_frame(source, ctx)?;
            let alias = ctx.register_join(source, frame);
            Ok(SqlExpr::column(alias, name))
        }
        // Anything else (a source table, or a `Filter`/`Sort` chain
        // over one) is resolved within the frame the enclosing
        // Filter/Pick already built — no join required, since the
        // column reference and the frame share the same underlying
        // table alias.
        _ => {
            let frame = lower_frame(source, ctx)?;
            Ok(SqlExpr::column(frame.alias, name))
        }
    }
}

/// Joins in a `GROUP BY patient_id` aggregate subquery and returns the
/// resulting scalar expression (spec §4.5 "Aggregations").
fn lower_aggregate(node: &NodeRef, agg: &Aggregate, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    let alias = crate::aggregate::join_for_aggregate(node, agg, ctx)?;
    let column = SqlExpr::column(alias, "agg_value");
    if matches!(agg, Aggregate::Exists(_)) {
        // `Exists` is never null: absent patients get `NULL` from the
        // left join and must read as `false` (real ehrql semantics),
        // not an unknown.
        let false_literal = ctx.dialect.literal_sql(&ehrql_types::Literal::Bool(false))?;
        Ok(SqlExpr::Raw(format!("COALESCE({}, {false_literal})", column.render())))
    } else {
        Ok(column)
    }
}

fn lower_function(func: &Function, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    use Function as F;
    match func {
        F::Eq(a, b) => binary("=", a, b, ctx),
        F::Ne(a, b) => binary("<>", a, b, ctx),
        F::Lt(a, b) => binary("<", a, b, ctx),
        F::Le(a, b) => binary("<=", a, b, ctx),
        F::Gt(a, b) => binary(">", a, b, ctx),
        F::Ge(a, b) => binary(">=", a, b, ctx),
        F::And(a, b) => binary("AND", a, b, ctx),
        F::Or(a, b) => binary("OR", a, b, ctx),
        F::Not(a) => Ok(SqlExpr::unary("NOT", lower_expr(a, ctx)?)),
        F::In(a, b) => lower_in(a, b, ctx),
        F::IsNull(a) => Ok(SqlExpr::Raw(format!("{} IS NULL", lower_expr(a, ctx)?.render()))),
        F::Add(a, b) => binary("+", a, b, ctx),
        F::Subtract(a, b) => binary("-", a, b, ctx),
        F::Multiply(a, b) => binary("*", a, b, ctx),
        F::TrueDivide(a, b) => lower_divide(a, b, ctx, false),
        F::FloorDivide(a, b) => lower_divide(a, b, ctx, true),
        F::Negate(a) => Ok(SqlExpr::unary("-", lower_expr(a, ctx)?)),
        F::StringContains(a, b) => {
            let haystack = lower_expr(a, ctx)?.render();
            let needle = lower_expr(b, ctx)?.render();
            Ok(SqlExpr::Raw(ctx.dialect.string_contains(&haystack, &needle)))
        }
        F::YearFromDate(a) => date_unary(a, ctx, |d, c| c.dialect.year_from_date(d)),
        F::MonthFromDate(a) => date_unary(a, ctx, |d, c| c.dialect.month_from_date(d)),
        F::DayFromDate(a) => date_unary(a, ctx, |d, c| c.dialect.day_from_date(d)),
        F::ToFirstOfMonth(a) => date_unary(a, ctx, |d, c| c.dialect.first_of_month(d)),
        F::ToFirstOfYear(a) => date_unary(a, ctx, |d, c| c.dialect.first_of_year(d)),
        F::DateAddDays(a, b) => date_binary(a, b, ctx, |d, e, c| c.dialect.date_add_days(d, e)),
        F::DateAddMonths(a, b) => date_binary(a, b, ctx, |d, e, c| c.dialect.date_add_months(d, e)),
        F::DateAddYears(a, b) => date_binary(a, b, ctx, |d, e, c| c.dialect.date_add_years(d, e)),
        F::DateDifferenceInDays(a, b) => date_binary(a, b, ctx, |d, e, c| c.dialect.date_diff_days(d, e)),
        F::DateDifferenceInMonths(a, b) => date_binary(a, b, ctx, |d, e, c| c.dialect.date_diff_months(d, e)),
        F::DateDifferenceInYears(a, b) => date_binary(a, b, ctx, |d, e, c| c.dialect.date_diff_years(d, e)),
        F::CastToInt(a) => Ok(SqlExpr::Raw(format!("CAST({} AS INTEGER)", lower_expr(a, ctx)?.render()))),
        F::CastToFloat(a) => Ok(SqlExpr::Raw(format!("CAST({} AS FLOAT)", lower_expr(a, ctx)?.render()))),
        F::MinimumOf(xs) => reduce("<=", xs, ctx),
        F::MaximumOf(xs) => reduce(">=", xs, ctx),
    }
}

fn binary(op: &'static str, a: &NodeRef, b: &NodeRef, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    Ok(SqlExpr::binary(op, lower_expr(a, ctx)?, lower_expr(b, ctx)?))
}

fn date_unary(a: &NodeRef, ctx: &mut LowerCtx, render: impl FnOnce(&str, &LowerCtx) -> String) -> Result<SqlExpr> {
    let a_sql = lower_expr(a, ctx)?.render();
    Ok(SqlExpr::Raw(render(&a_sql, ctx)))
}

fn date_binary(
    a: &NodeRef,
    b: &NodeRef,
    ctx: &mut LowerCtx,
    render: impl FnOnce(&str, &str, &LowerCtx) -> String,
) -> Result<SqlExpr> {
    let a_sql = lower_expr(a, ctx)?.render();
    let b_sql = lower_expr(b, ctx)?.render();
    Ok(SqlExpr::Raw(render(&a_sql, &b_sql, ctx)))
}

/// `minimum_of`/`maximum_of`: a left fold of pairwise `CASE WHEN a OP b
/// THEN a ELSE b END`, since neither backend's aggregate `MIN`/`MAX`
/// applies across sibling columns on one row.
fn reduce(keep_lhs_when: &'static str, xs: &[NodeRef], ctx: &mut LowerCtx) -> Result<SqlExpr> {
    let mut exprs = xs.iter().map(|x| lower_expr(x, ctx)).collect::<Result<Vec<_>>>()?.into_iter();
    let first = exprs.next().expect("MinimumOf/MaximumOf require at least one operand");
    Ok(exprs.fold(first, |acc, next| {
        let keep_acc = SqlExpr::binary(keep_lhs_when, acc.clone(), next.clone());
        SqlExpr::Case { arms: vec![(keep_acc, acc)], default: Some(Box::new(next)) }
    }))
}

/// `lhs / NULLIF(rhs, 0)` (spec §4.5 "Division"), `FLOOR`-wrapped for
/// `FloorDivide`.
fn lower_divide(a: &NodeRef, b: &NodeRef, ctx: &mut LowerCtx, floor: bool) -> Result<SqlExpr> {
    let lhs = lower_expr(a, ctx)?.render();
    let rhs = lower_expr(b, ctx)?.render();
    let guarded = format!("{lhs} / NULLIF({rhs}, 0)");
    if floor {
        Ok(SqlExpr::Raw(format!("FLOOR({guarded})")))
    } else {
        Ok(SqlExpr::Raw(guarded))
    }
}

fn lower_in(a: &NodeRef, b: &NodeRef, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    let lhs = lower_expr(a, ctx)?;
    match b.as_ref() {
        Node::Value(ValueLiteral::Set(_)) => {
            let rhs = lower_expr(b, ctx)?;
            Ok(SqlExpr::Raw(format!("{} IN {}", lhs.render(), rhs.render())))
        }
        Node::SelectColumn { source, name } if !b.domain().is_patient() => {
            let frame = lower_frame(source, ctx)?;
            Ok(SqlExpr::Raw(format!(
                "{} IN (SELECT {}.{name} FROM {} AS {})",
                lhs.render(),
                frame.alias,
                frame.from_sql,
                frame.alias
            )))
        }
        // A patient-domain right-hand side (a plain series, or a
        // `CombineAsSet` aggregate) degenerates to direct comparison
        // against the joined scalar.
        _ => {
            let rhs = lower_expr(b, ctx)?;
            Ok(SqlExpr::binary("=", lhs, rhs))
        }
    }
}

fn lower_case(cases: &[(NodeRef, NodeRef)], default: &Option<NodeRef>, ctx: &mut LowerCtx) -> Result<SqlExpr> {
    let mut arms = Vec::with_capacity(cases.len());
    for (condition, value) in cases {
        arms.push((lower_expr(condition, ctx)?, lower_expr(value, ctx)?));
    }
    let default = default.as_ref().map(|d| lower_expr(d, ctx)).transpose()?.map(Box::new);
    Ok(SqlExpr::Case { arms, default })
}
