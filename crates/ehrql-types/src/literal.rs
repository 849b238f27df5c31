//! Literal scalar values and the typed sets built from them.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::code::Code;

/// A totally-ordered, hashable wrapper around `f64`.
///
/// Query literals are fixed constants supplied by the query author, never
/// the result of floating-point computation, so bitwise equality and an
/// IEEE-754 total order (NaN excluded by construction — see
/// [`FiniteFloat::new`]) are the right semantics for a value that must be
/// hashable and orderable inside a frozen [`BTreeSet`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FiniteFloat(f64);

impl FiniteFloat {
    /// Wrap a finite `f64`. Returns `None` for NaN or infinite values,
    /// which have no place in a query literal.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() { Some(Self(value)) } else { None }
    }

    /// The wrapped value.
    pub fn get(&self) -> f64 {
        self.0
    }
}

impl PartialEq for FiniteFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}
impl Eq for FiniteFloat {}

impl PartialOrd for FiniteFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FiniteFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl std::hash::Hash for FiniteFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for FiniteFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single literal value embedded in a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Literal {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(FiniteFloat),
    /// String literal.
    Str(String),
    /// Calendar date literal, serialized as ISO-8601 (`YYYY-MM-DD`).
    Date(NaiveDate),
    /// Clinical code literal.
    Code(Code),
}

impl Literal {
    /// The runtime primitive tag of this literal.
    pub fn primitive(&self) -> crate::primitive::Primitive {
        use crate::primitive::Primitive;
        match self {
            Self::Bool(_) => Primitive::Bool,
            Self::Int(_) => Primitive::Int,
            Self::Float(_) => Primitive::Float,
            Self::Str(_) => Primitive::Str,
            Self::Date(_) => Primitive::Date,
            Self::Code(_) => Primitive::Code,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Code(c) => write!(f, "{c}"),
        }
    }
}

/// A frozen, deduplicated set of literals, all of the same primitive type.
///
/// Used by `Value(frozen set of literals)` (spec §3) and by `In`/codelist
/// membership checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiteralSet(BTreeSet<Literal>);

impl LiteralSet {
    /// Build a set, rejecting a mix of primitive types (e.g. a `Code` of
    /// one system mixed with a `Code` of another are allowed to differ in
    /// *value* but the constructor does not itself check code-system
    /// homogeneity — that is an operator-specific constraint checked by
    /// `ehrql-model`, see spec §4.2 "literal-value fit").
    pub fn new(values: impl IntoIterator<Item = Literal>) -> Result<Self, crate::TypesError> {
        let set: BTreeSet<Literal> = values.into_iter().collect();
        let mut kinds = set.iter().map(Literal::primitive);
        if let Some(first) = kinds.next() {
            for other in kinds {
                if other != first {
                    return Err(crate::TypesError::HeterogeneousCollection(
                        first.as_str(),
                        other.as_str(),
                    ));
                }
            }
        }
        Ok(Self(set))
    }

    /// The element primitive type, if the set is non-empty.
    pub fn element_primitive(&self) -> Option<crate::primitive::Primitive> {
        self.0.iter().next().map(Literal::primitive)
    }

    /// Iterate over the set's members.
    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.0.iter()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `value` is a member.
    pub fn contains(&self, value: &Literal) -> bool {
        self.0.contains(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mixed_primitive_sets() {
        let err = LiteralSet::new([Literal::Int(1), Literal::Str("x".into())]).unwrap_err();
        assert!(matches!(err, crate::TypesError::HeterogeneousCollection(_, _)));
    }

    #[test]
    fn dedupes_equal_literals() {
        let set = LiteralSet::new([Literal::Int(1), Literal::Int(1), Literal::Int(2)]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn float_literal_is_totally_ordered() {
        let a = FiniteFloat::new(1.5).unwrap();
        let b = FiniteFloat::new(2.5).unwrap();
        assert!(a < b);
        assert!(FiniteFloat::new(f64::NAN).is_none());
    }
}
