//! The type specification lattice and the type matcher.
//!
//! A [`TypeSpec`] describes either a concrete runtime type (built from
//! [`Primitive`] and the parametric containers `Series`/`Set`/`Mapping`) or,
//! when used as a *target* for matching, a pattern that may contain type
//! variables ([`TypeSpec::Var`]) that bind on first match and must stay
//! consistent across subsequent occurrences — the scheme an operator's
//! signature uses to say "these two arguments must share a type" (spec
//! §4.1/§4.2).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::literal::{Literal, LiteralSet};
use crate::primitive::Primitive;

/// A type, or a type pattern containing variables.
///
/// `Any` is the universal top of the lattice, used only internally (e.g. a
/// `Case` with an unspecified default type — spec §9 Open Questions, decided
/// as null-typed in `ehrql-model`, not here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeSpec {
    /// A scalar primitive type.
    Primitive(Primitive),
    /// `Series[T]`: a column of values of type `T`.
    Series(Box<TypeSpec>),
    /// A (frozen) set of values of type `T`.
    Set(Box<TypeSpec>),
    /// A mapping from keys of type `K` to values of type `V`.
    Mapping(Box<TypeSpec>, Box<TypeSpec>),
    /// A type variable, identified by name. Only meaningful as part of a
    /// *target* pattern passed to [`match_typespec`].
    Var(String),
    /// The universal top type.
    Any,
}

impl TypeSpec {
    /// Shorthand for `Primitive(p)`.
    pub fn prim(p: Primitive) -> Self {
        Self::Primitive(p)
    }

    /// Shorthand for `Series(Primitive(p))`.
    pub fn series_of(p: Primitive) -> Self {
        Self::Series(Box::new(Self::Primitive(p)))
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::Series(inner) => write!(f, "Series[{inner}]"),
            Self::Set(inner) => write!(f, "Set[{inner}]"),
            Self::Mapping(k, v) => write!(f, "Mapping[{k}, {v}]"),
            Self::Var(name) => write!(f, "'{name}"),
            Self::Any => write!(f, "Any"),
        }
    }
}

/// Variable bindings accumulated while matching a candidate type against a
/// target pattern.
pub type Bindings = BTreeMap<String, TypeSpec>;

/// Check whether `candidate` (a concrete type) satisfies `target` (a type,
/// possibly containing variables), threading variable bindings through.
///
/// A variable in `target` binds to whatever it first matches; any later
/// occurrence of the same variable name must match an *identical* type, or
/// the match fails — this is what lets an operator signature express "both
/// arguments and the result share a type" without fixing which type ahead
/// of time.
pub fn match_typespec(candidate: &TypeSpec, target: &TypeSpec, bindings: &mut Bindings) -> bool {
    match target {
        TypeSpec::Any => true,
        TypeSpec::Var(name) => match bindings.get(name) {
            Some(bound) => {
                let bound = bound.clone();
                match_typespec(candidate, &bound, bindings)
            }
            None => {
                bindings.insert(name.clone(), candidate.clone());
                true
            }
        },
        TypeSpec::Primitive(target_prim) => {
            matches!(candidate, TypeSpec::Primitive(p) if p == target_prim)
        }
        TypeSpec::Series(target_inner) => match candidate {
            TypeSpec::Series(candidate_inner) => {
                match_typespec(candidate_inner, target_inner, bindings)
            }
            _ => false,
        },
        TypeSpec::Set(target_inner) => match candidate {
            TypeSpec::Set(candidate_inner) => {
                match_typespec(candidate_inner, target_inner, bindings)
            }
            _ => false,
        },
        TypeSpec::Mapping(target_key, target_value) => match candidate {
            TypeSpec::Mapping(candidate_key, candidate_value) => {
                match_typespec(candidate_key, target_key, bindings)
                    && match_typespec(candidate_value, target_value, bindings)
            }
            _ => false,
        },
    }
}

/// Derive the runtime [`TypeSpec`] of a single literal.
pub fn get_typespec_literal(literal: &Literal) -> TypeSpec {
    TypeSpec::Primitive(literal.primitive())
}

/// Derive the runtime [`TypeSpec`] of a literal set, rejecting empty
/// collections (which have no unambiguous element type — spec §4.1).
/// Heterogeneous collections are already rejected at [`LiteralSet`]
/// construction time.
pub fn get_typespec_set(set: &LiteralSet) -> crate::Result<TypeSpec> {
    let element = set
        .element_primitive()
        .ok_or(crate::TypesError::EmptyCollection)?;
    Ok(TypeSpec::Set(Box::new(TypeSpec::Primitive(element))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_binds_on_first_match() {
        let mut bindings = Bindings::new();
        let candidate = TypeSpec::prim(Primitive::Int);
        let target = TypeSpec::Var("T".into());
        assert!(match_typespec(&candidate, &target, &mut bindings));
        assert_eq!(bindings.get("T"), Some(&TypeSpec::prim(Primitive::Int)));
    }

    #[test]
    fn variable_must_stay_consistent() {
        let mut bindings = Bindings::new();
        let target = TypeSpec::Var("T".into());
        assert!(match_typespec(&TypeSpec::prim(Primitive::Int), &target, &mut bindings));
        // Second occurrence of the same variable, different candidate type.
        assert!(!match_typespec(&TypeSpec::prim(Primitive::Str), &target, &mut bindings));
    }

    #[test]
    fn bool_does_not_match_int_target() {
        let mut bindings = Bindings::new();
        assert!(!match_typespec(
            &TypeSpec::prim(Primitive::Bool),
            &TypeSpec::prim(Primitive::Int),
            &mut bindings
        ));
    }

    #[test]
    fn series_destructures_element_wise() {
        let mut bindings = Bindings::new();
        let candidate = TypeSpec::series_of(Primitive::Date);
        let target = TypeSpec::Series(Box::new(TypeSpec::Var("T".into())));
        assert!(match_typespec(&candidate, &target, &mut bindings));
        assert_eq!(bindings.get("T"), Some(&TypeSpec::prim(Primitive::Date)));
    }

    #[test]
    fn any_matches_everything() {
        let mut bindings = Bindings::new();
        assert!(match_typespec(
            &TypeSpec::series_of(Primitive::Code),
            &TypeSpec::Any,
            &mut bindings
        ));
    }
}
