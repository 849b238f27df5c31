//! The two-step conditional builder (spec §4.3): `when(c).then(v)` chained
//! any number of times, terminated by `.otherwise(default)` or
//! `.otherwise_null()`. Also exposes the one-shot `case(*branches,
//! default)` form for when every arm is already in hand.

use std::marker::PhantomData;

use ehrql_model::{Node, NodeRef};

use crate::error::Result;
use crate::series::{BoolT, ElementType, Series};

/// Start a conditional: `when(condition).then(value)...`.
pub fn when(condition: &Series<BoolT>) -> WhenPending {
    WhenPending { condition: condition.node().clone() }
}

/// A condition awaiting its value (the first step of `when(c).then(v)`).
pub struct WhenPending {
    condition: NodeRef,
}

impl WhenPending {
    /// Supply the value for this branch, fixing the conditional's
    /// result type.
    pub fn then<T: ElementType>(self, value: &Series<T>) -> CaseBuilder<T> {
        CaseBuilder::with_arms(vec![(self.condition, value.node().clone())])
    }
}

/// An in-progress `Case` expression: one or more `(condition, value)`
/// arms, evaluated in insertion order with first-match-wins semantics.
pub struct CaseBuilder<T: ElementType> {
    arms: Vec<(NodeRef, NodeRef)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ElementType> CaseBuilder<T> {
    fn with_arms(arms: Vec<(NodeRef, NodeRef)>) -> Self {
        Self { arms, _marker: PhantomData }
    }

    /// Add another `when(condition)` branch.
    pub fn when(self, condition: &Series<BoolT>) -> WhenAppend<T> {
        WhenAppend { builder: self, condition: condition.node().clone() }
    }

    /// Finish the conditional with an explicit default for unmatched
    /// rows.
    pub fn otherwise(self, default: &Series<T>) -> Result<Series<T>> {
        let node = Node::case(self.arms, Some(default.node().clone()))?;
        Ok(Series::from_node(node))
    }

    /// Finish the conditional; unmatched rows are null (spec §3: "first
    /// matching branch wins; unmatched rows yield `default`, which
    /// defaults to null if unspecified").
    pub fn otherwise_null(self) -> Result<Series<T>> {
        let node = Node::case(self.arms, None)?;
        Ok(Series::from_node(node))
    }
}

/// A [`CaseBuilder`] awaiting the value for a newly-added branch.
pub struct WhenAppend<T: ElementType> {
    builder: CaseBuilder<T>,
    condition: NodeRef,
}

impl<T: ElementType> WhenAppend<T> {
    /// Supply the value for this branch.
    pub fn then(mut self, value: &Series<T>) -> CaseBuilder<T> {
        self.builder.arms.push((self.condition, value.node().clone()));
        self.builder
    }
}

/// `case(*branches, default=...)`: build a `Case` from an already
/// collected list of `(condition, value)` branches.
pub fn case<T: ElementType>(
    branches: impl IntoIterator<Item = (Series<BoolT>, Series<T>)>,
    default: Option<Series<T>>,
) -> Result<Series<T>> {
    let arms = branches.into_iter().map(|(c, v)| (c.node().clone(), v.node().clone())).collect();
    let node = Node::case(arms, default.map(|d| d.node().clone()))?;
    Ok(Series::from_node(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::IntT;

    #[test]
    fn first_matching_branch_wins_in_insertion_order() {
        let a = Series::<BoolT>::literal(true);
        let b = Series::<BoolT>::literal(false);
        let built = when(&a)
            .then(&Series::<IntT>::literal(1))
            .when(&b)
            .then(&Series::<IntT>::literal(2))
            .otherwise(&Series::<IntT>::literal(0));
        assert!(built.is_ok());
    }

    #[test]
    fn one_shot_case_matches_the_chained_form() {
        let a = Series::<BoolT>::literal(true);
        let built = case([(a, Series::<IntT>::literal(1))], Some(Series::<IntT>::literal(0)));
        assert!(built.is_ok());
    }
}
