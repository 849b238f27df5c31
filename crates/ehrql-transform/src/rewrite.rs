//! A single generic fold over the Query Model graph, shared by every
//! transform pass.
//!
//! Each pass supplies a [`NodeRewriter`] that only has to say what
//! happens at a `PickOneRowPerPatient` node (and, for the sort
//! stabilization pass, where substitution should short-circuit
//! recursion); every other node kind is rebuilt structurally by
//! [`rewrite`] through the same validating constructors `ehrql-model`
//! uses at first construction.

use std::collections::HashMap;
use std::sync::Arc;

use ehrql_builder::Result;
use ehrql_model::{Aggregate, Function, FunctionBuilder, Node, NodeRef, Position, function};

/// A cache key for a node: its `Arc` allocation's address. Two `NodeRef`
/// clones of the same node share this key, which is what makes the
/// rebuild a DAG-preserving fold rather than a tree explosion.
pub(crate) fn ptr_key(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as usize
}

/// The seam every transform pass customizes.
pub(crate) trait NodeRewriter {
    /// Called once a `PickOneRowPerPatient`'s `source` chain has already
    /// been rewritten. `original` is the pre-rewrite node, for passes
    /// that need to look up data keyed by its identity.
    fn rewrite_pick(&mut self, original: &NodeRef, source: NodeRef, position: Position) -> Result<NodeRef>;

    /// An early substitution hook, checked before the normal structural
    /// recursion. Returning `Some` stops the fold at this node. The
    /// default never short-circuits.
    fn shortcut(&mut self, _node: &NodeRef) -> Option<NodeRef> {
        None
    }
}

/// Rebuild `node` and everything beneath it, routing through `r` at
/// every `PickOneRowPerPatient`.
pub(crate) fn rewrite(node: &NodeRef, memo: &mut HashMap<usize, NodeRef>, r: &mut impl NodeRewriter) -> Result<NodeRef> {
    if let Some(replacement) = r.shortcut(node) {
        return Ok(replacement);
    }
    if let Some(cached) = memo.get(&ptr_key(node)) {
        return Ok(cached.clone());
    }
    let rebuilt = match node.as_ref() {
        Node::SelectTable { name, schema } => Node::select_table(name.clone(), schema.clone()),
        Node::SelectPatientTable { name, schema } => Node::select_patient_table(name.clone(), schema.clone()),
        Node::InlinePatientTable { rows, schema } => Node::inline_patient_table(rows.clone(), schema.clone())?,
        Node::Value(literal) => Arc::new(Node::Value(literal.clone())),
        Node::SelectColumn { source, name } => {
            let source = rewrite(source, memo, r)?;
            Node::select_column(source, name.clone())?
        }
        Node::Filter { source, condition } => {
            let source = rewrite(source, memo, r)?;
            let condition = rewrite(condition, memo, r)?;
            Node::filter(source, condition)?
        }
        Node::Sort { source, sort_by } => {
            let source = rewrite(source, memo, r)?;
            let sort_by = rewrite(sort_by, memo, r)?;
            Node::sort(source, sort_by)?
        }
        Node::PickOneRowPerPatient { source, position, .. } => {
            let new_source = rewrite(source, memo, r)?;
            r.rewrite_pick(node, new_source, *position)?
        }
        Node::AggregateByPatient(agg) => {
            let agg = rewrite_aggregate(agg, memo, r)?;
            Node::aggregate(agg)?
        }
        Node::Function(func) => rewrite_function(func, memo, r)?,
        Node::Case { cases, default } => {
            let cases =
                cases.iter().map(|(c, v)| Ok((rewrite(c, memo, r)?, rewrite(v, memo, r)?))).collect::<Result<Vec<_>>>()?;
            let default = default.as_ref().map(|d| rewrite(d, memo, r)).transpose()?;
            Node::case(cases, default)?
        }
    };
    memo.insert(ptr_key(node), rebuilt.clone());
    Ok(rebuilt)
}

fn rewrite_aggregate(agg: &Aggregate, memo: &mut HashMap<usize, NodeRef>, r: &mut impl NodeRewriter) -> Result<Aggregate> {
    Ok(match agg {
        Aggregate::Exists(s) => Aggregate::Exists(rewrite(s, memo, r)?),
        Aggregate::Count(s) => Aggregate::Count(rewrite(s, memo, r)?),
        Aggregate::Min(s) => Aggregate::Min(rewrite(s, memo, r)?),
        Aggregate::Max(s) => Aggregate::Max(rewrite(s, memo, r)?),
        Aggregate::Sum(s) => Aggregate::Sum(rewrite(s, memo, r)?),
        Aggregate::Mean(s) => Aggregate::Mean(rewrite(s, memo, r)?),
        Aggregate::CombineAsSet(s) => Aggregate::CombineAsSet(rewrite(s, memo, r)?),
    })
}

fn rewrite_function(func: &Function, memo: &mut HashMap<usize, NodeRef>, r: &mut impl NodeRewriter) -> Result<NodeRef> {
    let builder = match func {
        Function::Eq(a, b) => FunctionBuilder::Eq(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Ne(a, b) => FunctionBuilder::Ne(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Lt(a, b) => FunctionBuilder::Lt(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Le(a, b) => FunctionBuilder::Le(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Gt(a, b) => FunctionBuilder::Gt(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Ge(a, b) => FunctionBuilder::Ge(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::And(a, b) => FunctionBuilder::And(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Or(a, b) => FunctionBuilder::Or(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Not(a) => FunctionBuilder::Not(rewrite(a, memo, r)?),
        Function::In(a, b) => FunctionBuilder::In(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::IsNull(a) => FunctionBuilder::IsNull(rewrite(a, memo, r)?),
        Function::Add(a, b) => FunctionBuilder::Add(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Subtract(a, b) => FunctionBuilder::Subtract(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Multiply(a, b) => FunctionBuilder::Multiply(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::TrueDivide(a, b) => FunctionBuilder::TrueDivide(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::FloorDivide(a, b) => FunctionBuilder::FloorDivide(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::Negate(a) => FunctionBuilder::Negate(rewrite(a, memo, r)?),
        Function::StringContains(a, b) => FunctionBuilder::StringContains(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::YearFromDate(a) => FunctionBuilder::YearFromDate(rewrite(a, memo, r)?),
        Function::MonthFromDate(a) => FunctionBuilder::MonthFromDate(rewrite(a, memo, r)?),
        Function::DayFromDate(a) => FunctionBuilder::DayFromDate(rewrite(a, memo, r)?),
        Function::ToFirstOfMonth(a) => FunctionBuilder::ToFirstOfMonth(rewrite(a, memo, r)?),
        Function::ToFirstOfYear(a) => FunctionBuilder::ToFirstOfYear(rewrite(a, memo, r)?),
        Function::DateAddDays(a, b) => FunctionBuilder::DateAddDays(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::DateAddMonths(a, b) => FunctionBuilder::DateAddMonths(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::DateAddYears(a, b) => FunctionBuilder::DateAddYears(rewrite(a, memo, r)?, rewrite(b, memo, r)?),
        Function::DateDifferenceInDays(a, b) => {
            FunctionBuilder::DateDifferenceInDays(rewrite(a, memo, r)?, rewrite(b, memo, r)?)
        }
        Function::DateDifferenceInMonths(a, b) => {
            FunctionBuilder::DateDifferenceInMonths(rewrite(a, memo, r)?, rewrite(b, memo, r)?)
        }
        Function::DateDifferenceInYears(a, b) => {
            FunctionBuilder::DateDifferenceInYears(rewrite(a, memo, r)?, rewrite(b, memo, r)?)
        }
        Function::CastToInt(a) => FunctionBuilder::CastToInt(rewrite(a, memo, r)?),
        Function::CastToFloat(a) => FunctionBuilder::CastToFloat(rewrite(a, memo, r)?),
        Function::MinimumOf(xs) => {
            FunctionBuilder::MinimumOf(xs.iter().map(|x| rewrite(x, memo, r)).collect::<Result<Vec<_>>>()?)
        }
        Function::MaximumOf(xs) => {
            FunctionBuilder::MaximumOf(xs.iter().map(|x| rewrite(x, memo, r)).collect::<Result<Vec<_>>>()?)
        }
    };
    Ok(function(builder)?)
}

/// Every direct child of `node`, for read-only graph walks that don't
/// need to rebuild anything (the "attach selected columns" scan).
pub(crate) fn children(node: &Node) -> Vec<&NodeRef> {
    match node {
        Node::SelectTable { .. } | Node::SelectPatientTable { .. } | Node::InlinePatientTable { .. } | Node::Value(_) => {
            vec![]
        }
        Node::SelectColumn { source, .. } => vec![source],
        Node::Filter { source, condition } => vec![source, condition],
        Node::Sort { source, sort_by } => vec![source, sort_by],
        Node::PickOneRowPerPatient { source, .. } => vec![source],
        Node::AggregateByPatient(agg) => vec![aggregate_source(agg)],
        Node::Function(func) => function_operands(func),
        Node::Case { cases, default } => {
            let mut operands: Vec<&NodeRef> = cases.iter().flat_map(|(c, v)| [c, v]).collect();
            operands.extend(default.as_ref());
            operands
        }
    }
}

fn aggregate_source(agg: &Aggregate) -> &NodeRef {
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

fn function_operands(func: &Function) -> Vec<&NodeRef> {
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
        | Function::CastToFloat(a) => vec![a],
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
        | Function::DateDifferenceInYears(a, b) => vec![a, b],
        Function::MinimumOf(xs) | Function::MaximumOf(xs) => xs.iter().collect(),
    }
}
