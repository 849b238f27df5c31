//! Typed series: a [`Series<T>`] is a QM node tagged at the Rust type
//! level with its element primitive, so mismatched operand types are
//! caught at compile time wherever the element type alone decides it,
//! and deferred to a runtime [`BuilderError`] only where the mismatch is
//! structural (domain) rather than nominal (spec §4.3).
//!
//! Binary operators on a `Series<T>` are fallible: the two operands may
//! come from unrelated event tables, and domain compatibility can only
//! be checked once both derivation chains are in hand. Single-operand
//! operations (`is_null`, `to_int`, casts, date field extraction, `!`,
//! unary `-`) can never fail, because the element-type guarantee the
//! `Series<T>` already carries is the only thing [`ehrql_model`] would
//! otherwise check.

use std::marker::PhantomData;
use std::ops::{Add, BitAnd, BitOr, Mul, Neg, Not, Sub};

use ehrql_model::{Aggregate, FunctionBuilder, ModelError, Node, NodeRef, ValueLiteral, function};
use ehrql_types::{Code, FiniteFloat, Literal, LiteralSet, Primitive};

use crate::duration::{self, Duration};
use crate::error::Result;

/// A zero-sized tag identifying a series' runtime element type.
pub trait ElementType: Copy + Clone + std::fmt::Debug + 'static {
    /// The primitive this marker stands for.
    const PRIMITIVE: Primitive;
    /// The natural Rust value a query literal of this type is built from.
    type Native;

    /// Wrap a native value as a QM [`Literal`].
    fn to_literal(value: Self::Native) -> Literal;
}

macro_rules! element_type {
    ($name:ident, $prim:expr, $native:ty, $wrap:expr) => {
        /// Marks a [`Series`] as carrying this element type.
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ElementType for $name {
            const PRIMITIVE: Primitive = $prim;
            type Native = $native;

            fn to_literal(value: Self::Native) -> Literal {
                $wrap(value)
            }
        }
    };
}

element_type!(BoolT, Primitive::Bool, bool, Literal::Bool);
element_type!(IntT, Primitive::Int, i64, Literal::Int);
element_type!(StrT, Primitive::Str, String, Literal::Str);
element_type!(DateT, Primitive::Date, chrono::NaiveDate, Literal::Date);
element_type!(CodeT, Primitive::Code, Code, Literal::Code);

/// Marks a [`Series`] as carrying a floating-point element type.
#[derive(Debug, Clone, Copy)]
pub struct FloatT;

impl ElementType for FloatT {
    const PRIMITIVE: Primitive = Primitive::Float;
    type Native = f64;

    fn to_literal(value: f64) -> Literal {
        Literal::Float(FiniteFloat::new(value).expect("query literals must be finite"))
    }
}

/// Element types that support arithmetic (`+`, `-`, `*`, division,
/// aggregation by `sum`/`mean`).
pub trait Numeric: ElementType {}
impl Numeric for IntT {}
impl Numeric for FloatT {}

/// Element types with a total order, usable with `<`/`<=`/`>`/`>=`,
/// `minimum_of`/`maximum_of`.
pub trait Orderable: ElementType {}
impl Orderable for IntT {}
impl Orderable for FloatT {}
impl Orderable for DateT {}
impl Orderable for StrT {}

fn wrap<T: ElementType>(result: ehrql_model::Result<NodeRef>) -> Result<Series<T>> {
    Ok(Series::from_node(result?))
}

/// Build from a [`FunctionBuilder`] variant whose validation can never
/// fail for a correctly-typed `Series<T>` operand — i.e. anything with
/// exactly one operand, whose only precondition is the element type
/// `Series<T>` already guarantees.
fn build_infallible(kind: FunctionBuilder) -> NodeRef {
    function(kind).expect("single-operand builder call whose type precondition Series<T> already guarantees")
}

/// A QM node known, at the Rust type level, to evaluate to `T` values.
pub struct Series<T: ElementType> {
    node: NodeRef,
    _marker: PhantomData<T>,
}

impl<T: ElementType> Clone for Series<T> {
    fn clone(&self) -> Self {
        Self { node: self.node.clone(), _marker: PhantomData }
    }
}

impl<T: ElementType> std::fmt::Debug for Series<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series").field("type", &T::PRIMITIVE).field("node", &self.node.kind_name()).finish()
    }
}

impl<T: ElementType> Series<T> {
    pub(crate) fn from_node(node: NodeRef) -> Self {
        Self { node, _marker: PhantomData }
    }

    /// The underlying QM node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// A constant series holding a single literal value.
    pub fn literal(value: T::Native) -> Self {
        Self::from_node(Node::value_scalar(T::to_literal(value)))
    }

    /// `self.is_null()`.
    pub fn is_null(&self) -> Series<BoolT> {
        Series::from_node(build_infallible(FunctionBuilder::IsNull(self.node.clone())))
    }

    /// `self == other`.
    pub fn eq(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::Eq(self.node.clone(), other.node.clone())))
    }

    /// `self != other`.
    pub fn ne(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::Ne(self.node.clone(), other.node.clone())))
    }

    /// `self.is_in({values...})`: membership against a frozen literal set.
    pub fn is_in(&self, values: impl IntoIterator<Item = T::Native>) -> Result<Series<BoolT>> {
        let literals: Vec<Literal> = values.into_iter().map(T::to_literal).collect();
        let set = LiteralSet::new(literals).map_err(ModelError::from)?;
        wrap(function(FunctionBuilder::In(self.node.clone(), Node::value_set(set))))
    }

    /// `self.is_in(other)`: membership against another series (e.g. an
    /// event-domain codelist column).
    pub fn is_in_series(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::In(self.node.clone(), other.node.clone())))
    }

    /// `self.if_null_then(default)`: substitute `default` for null values.
    pub fn if_null_then(&self, default: &Series<T>) -> Result<Series<T>> {
        let condition = self.is_null();
        let node = Node::case(vec![(condition.node, default.node.clone())], Some(self.node.clone()))?;
        Ok(Series::from_node(node))
    }

    /// Recode values through an explicit mapping, with an optional
    /// default for unmapped (non-null) values.
    pub fn map_values(
        &self,
        mapping: impl IntoIterator<Item = (T::Native, T::Native)>,
        default: Option<T::Native>,
    ) -> Result<Series<T>> {
        let arms = mapping
            .into_iter()
            .map(|(from, to)| -> Result<_> {
                let condition = self.eq(&Series::literal(from))?;
                Ok((condition.node, Series::<T>::literal(to).node))
            })
            .collect::<Result<Vec<_>>>()?;
        let default_node = default.map(|value| Series::<T>::literal(value).node);
        let node = Node::case(arms, default_node)?;
        Ok(Series::from_node(node))
    }

    /// Count of rows per patient (aggregating an event-domain series).
    pub fn count(&self) -> Result<Series<IntT>> {
        wrap(Node::aggregate(Aggregate::Count(self.node.clone())))
    }

    /// Whether the source has any rows at all, per patient.
    pub fn exists(&self) -> Result<Series<BoolT>> {
        wrap(Node::aggregate(Aggregate::Exists(self.node.clone())))
    }

    /// Minimum value per patient.
    pub fn min(&self) -> Result<Series<T>> {
        wrap(Node::aggregate(Aggregate::Min(self.node.clone())))
    }

    /// Maximum value per patient.
    pub fn max(&self) -> Result<Series<T>> {
        wrap(Node::aggregate(Aggregate::Max(self.node.clone())))
    }

    /// All distinct values per patient, as a frozen set.
    pub fn combine_as_set(&self) -> Result<SeriesSet<T>> {
        let node = Node::aggregate(Aggregate::CombineAsSet(self.node.clone()))?;
        Ok(SeriesSet::from_node(node))
    }
}

impl<T: Orderable> Series<T> {
    /// `self < other`.
    pub fn lt(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::Lt(self.node.clone(), other.node.clone())))
    }

    /// `self <= other`.
    pub fn le(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::Le(self.node.clone(), other.node.clone())))
    }

    /// `self > other`.
    pub fn gt(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::Gt(self.node.clone(), other.node.clone())))
    }

    /// `self >= other`.
    pub fn ge(&self, other: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::Ge(self.node.clone(), other.node.clone())))
    }
}

impl<T: Numeric> Series<T> {
    /// `self // other`: floored division, null on division by zero
    /// (lowering concern — see `ehrql-sql`).
    pub fn floor_divide(&self, other: &Series<T>) -> Result<Series<T>> {
        wrap(function(FunctionBuilder::FloorDivide(self.node.clone(), other.node.clone())))
    }

    /// `self / other`, always a float result, null on division by zero.
    pub fn true_divide(&self, other: &Series<T>) -> Result<Series<FloatT>> {
        wrap(function(FunctionBuilder::TrueDivide(self.node.clone(), other.node.clone())))
    }

    /// Sum of values per patient.
    pub fn sum(&self) -> Result<Series<T>> {
        wrap(Node::aggregate(Aggregate::Sum(self.node.clone())))
    }

    /// Arithmetic mean per patient. Always a `float` result (spec §9
    /// Open Questions).
    pub fn mean(&self) -> Result<Series<FloatT>> {
        wrap(Node::aggregate(Aggregate::Mean(self.node.clone())))
    }
}

impl<T: Numeric> Add for Series<T> {
    type Output = Result<Series<T>>;
    fn add(self, rhs: Self) -> Self::Output {
        wrap(function(FunctionBuilder::Add(self.node, rhs.node)))
    }
}

impl<T: Numeric> Sub for Series<T> {
    type Output = Result<Series<T>>;
    fn sub(self, rhs: Self) -> Self::Output {
        wrap(function(FunctionBuilder::Subtract(self.node, rhs.node)))
    }
}

impl<T: Numeric> Mul for Series<T> {
    type Output = Result<Series<T>>;
    fn mul(self, rhs: Self) -> Self::Output {
        wrap(function(FunctionBuilder::Multiply(self.node, rhs.node)))
    }
}

impl<T: Numeric> Neg for Series<T> {
    type Output = Series<T>;
    fn neg(self) -> Series<T> {
        Series::from_node(build_infallible(FunctionBuilder::Negate(self.node)))
    }
}

impl Series<IntT> {
    /// Cast to `float`.
    pub fn to_float(&self) -> Series<FloatT> {
        Series::from_node(build_infallible(FunctionBuilder::CastToFloat(self.node.clone())))
    }
}

impl Series<FloatT> {
    /// Cast to `int` (truncating).
    pub fn to_int(&self) -> Series<IntT> {
        Series::from_node(build_infallible(FunctionBuilder::CastToInt(self.node.clone())))
    }
}

impl BitAnd for Series<BoolT> {
    type Output = Result<Series<BoolT>>;
    fn bitand(self, rhs: Self) -> Self::Output {
        wrap(function(FunctionBuilder::And(self.node, rhs.node)))
    }
}

impl BitOr for Series<BoolT> {
    type Output = Result<Series<BoolT>>;
    fn bitor(self, rhs: Self) -> Self::Output {
        wrap(function(FunctionBuilder::Or(self.node, rhs.node)))
    }
}

impl Not for Series<BoolT> {
    type Output = Series<BoolT>;
    fn not(self) -> Series<BoolT> {
        Series::from_node(build_infallible(FunctionBuilder::Not(self.node)))
    }
}

impl Series<StrT> {
    /// `self.contains(needle)`.
    pub fn contains(&self, needle: &Series<StrT>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::StringContains(self.node.clone(), needle.node.clone())))
    }
}

impl Series<DateT> {
    /// `self.year`.
    pub fn year(&self) -> Series<IntT> {
        Series::from_node(build_infallible(FunctionBuilder::YearFromDate(self.node.clone())))
    }

    /// `self.month`.
    pub fn month(&self) -> Series<IntT> {
        Series::from_node(build_infallible(FunctionBuilder::MonthFromDate(self.node.clone())))
    }

    /// `self.day`.
    pub fn day(&self) -> Series<IntT> {
        Series::from_node(build_infallible(FunctionBuilder::DayFromDate(self.node.clone())))
    }

    /// `self.to_first_of_month()`.
    pub fn to_first_of_month(&self) -> Series<DateT> {
        Series::from_node(build_infallible(FunctionBuilder::ToFirstOfMonth(self.node.clone())))
    }

    /// `self.to_first_of_year()`.
    pub fn to_first_of_year(&self) -> Series<DateT> {
        Series::from_node(build_infallible(FunctionBuilder::ToFirstOfYear(self.node.clone())))
    }

    /// Add `days` (a dynamic, per-row day count) to this date.
    pub fn add_days(&self, days: &Series<IntT>) -> Result<Series<DateT>> {
        wrap(function(FunctionBuilder::DateAddDays(self.node.clone(), days.node.clone())))
    }

    /// Add `months` (a dynamic, per-row month count) to this date.
    pub fn add_months(&self, months: &Series<IntT>) -> Result<Series<DateT>> {
        wrap(function(FunctionBuilder::DateAddMonths(self.node.clone(), months.node.clone())))
    }

    /// Add `years` (a dynamic, per-row year count) to this date.
    pub fn add_years(&self, years: &Series<IntT>) -> Result<Series<DateT>> {
        wrap(function(FunctionBuilder::DateAddYears(self.node.clone(), years.node.clone())))
    }

    /// `self - other`: a lazy handle exposing `.days()`/`.weeks()`/
    /// `.months()`/`.years()`, each lowering to its own QM node on
    /// demand (spec §4.3).
    pub fn difference_from(&self, other: &Series<DateT>) -> DateDifference {
        DateDifference { from: self.node.clone(), to: other.node.clone() }
    }
}

impl Add<Duration> for Series<DateT> {
    type Output = Result<Series<DateT>>;

    fn add(self, rhs: Duration) -> Self::Output {
        use crate::duration::DurationUnit;

        if let Node::Value(ValueLiteral::Scalar(Literal::Date(date))) = self.node.as_ref() {
            let folded = match rhs.unit {
                DurationUnit::Days => duration::add_days(*date, rhs.value)
                    .ok_or_else(|| ModelError::InvalidLiteral(format!("date + {} days overflows the calendar", rhs.value)))?,
                DurationUnit::Months => duration::add_months(*date, rhs.value),
                DurationUnit::Years => duration::add_years(*date, rhs.value),
            };
            return Ok(Series::literal(folded));
        }

        let amount = Node::value_scalar(Literal::Int(rhs.value));
        let kind = match rhs.unit {
            DurationUnit::Days => FunctionBuilder::DateAddDays(self.node, amount),
            DurationUnit::Months => FunctionBuilder::DateAddMonths(self.node, amount),
            DurationUnit::Years => FunctionBuilder::DateAddYears(self.node, amount),
        };
        wrap(function(kind))
    }
}

impl Sub<Duration> for Series<DateT> {
    type Output = Result<Series<DateT>>;
    fn sub(self, rhs: Duration) -> Self::Output {
        self + rhs.negate()
    }
}

/// A lazy `date - date` handle (spec §4.3): constructing it never fails,
/// the underlying QM node is only built when a property is read.
#[derive(Debug, Clone)]
pub struct DateDifference {
    from: NodeRef,
    to: NodeRef,
}

impl DateDifference {
    /// Signed day count.
    pub fn days(&self) -> Result<Series<IntT>> {
        wrap(function(FunctionBuilder::DateDifferenceInDays(self.from.clone(), self.to.clone())))
    }

    /// Whole weeks (`days // 7`).
    pub fn weeks(&self) -> Result<Series<IntT>> {
        self.days()?.floor_divide(&Series::literal(7))
    }

    /// Whole months between the two dates.
    pub fn months(&self) -> Result<Series<IntT>> {
        wrap(function(FunctionBuilder::DateDifferenceInMonths(self.from.clone(), self.to.clone())))
    }

    /// Whole years between the two dates.
    pub fn years(&self) -> Result<Series<IntT>> {
        wrap(function(FunctionBuilder::DateDifferenceInYears(self.from.clone(), self.to.clone())))
    }
}

/// The frozen per-patient set produced by [`Series::combine_as_set`].
#[derive(Debug, Clone)]
pub struct SeriesSet<T: ElementType> {
    node: NodeRef,
    _marker: PhantomData<T>,
}

impl<T: ElementType> SeriesSet<T> {
    pub(crate) fn from_node(node: NodeRef) -> Self {
        Self { node, _marker: PhantomData }
    }

    /// The underlying QM node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Whether `value` is a member of this set.
    pub fn contains(&self, value: &Series<T>) -> Result<Series<BoolT>> {
        wrap(function(FunctionBuilder::In(value.node.clone(), self.node.clone())))
    }
}

/// `minimum_of(*values)`. Empty input is a construction error (spec §9
/// Open Questions).
pub fn minimum_of<T: Orderable>(values: impl IntoIterator<Item = Series<T>>) -> Result<Series<T>> {
    let nodes = values.into_iter().map(|s| s.node).collect();
    wrap(function(FunctionBuilder::MinimumOf(nodes)))
}

/// `maximum_of(*values)`. Empty input is a construction error.
pub fn maximum_of<T: Orderable>(values: impl IntoIterator<Item = Series<T>>) -> Result<Series<T>> {
    let nodes = values.into_iter().map(|s| s.node).collect();
    wrap(function(FunctionBuilder::MaximumOf(nodes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_on_matching_element_types_succeeds() {
        let a = Series::<IntT>::literal(1);
        let b = Series::<IntT>::literal(2);
        let sum = (a + b).unwrap();
        assert_eq!(sum.node().result_type(), ehrql_types::TypeSpec::Primitive(Primitive::Int));
    }

    #[test]
    fn true_divide_is_always_float() {
        let a = Series::<IntT>::literal(6);
        let b = Series::<IntT>::literal(4);
        let quotient = a.true_divide(&b).unwrap();
        assert_eq!(quotient.node().result_type(), ehrql_types::TypeSpec::Primitive(Primitive::Float));
    }

    #[test]
    fn is_null_and_not_compose_without_fallibility() {
        let a = Series::<IntT>::literal(1);
        let is_present = !a.is_null();
        assert_eq!(is_present.node().result_type(), ehrql_types::TypeSpec::Primitive(Primitive::Bool));
    }

    #[test]
    fn date_plus_literal_duration_folds_immediately() {
        let date = Series::<DateT>::literal(chrono::NaiveDate::from_ymd_opt(2020, 1, 31).unwrap());
        let result = (date + Duration::months(1)).unwrap();
        match result.node().as_ref() {
            Node::Value(ValueLiteral::Scalar(Literal::Date(d))) => {
                assert_eq!(*d, chrono::NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
            }
            other => panic!("expected a folded literal date, got {other:?}"),
        }
    }

    #[test]
    fn date_difference_is_lazy_until_a_property_is_read() {
        let a = Series::<DateT>::literal(chrono::NaiveDate::from_ymd_opt(2020, 3, 2).unwrap());
        let b = Series::<DateT>::literal(chrono::NaiveDate::from_ymd_opt(2000, 9, 2).unwrap());
        let difference = a.difference_from(&b);
        let years = difference.years().unwrap();
        assert_eq!(years.node().result_type(), ehrql_types::TypeSpec::Primitive(Primitive::Int));
    }

    #[test]
    fn minimum_of_empty_is_a_construction_error() {
        let result = minimum_of::<IntT>(std::iter::empty());
        assert!(result.is_err());
    }

    #[test]
    fn is_in_checks_membership_against_a_literal_set() {
        let code = Series::<IntT>::literal(5);
        let membership = code.is_in([1, 2, 5]).unwrap();
        assert_eq!(membership.node().result_type(), ehrql_types::TypeSpec::Primitive(Primitive::Bool));
    }
}
