//! Primitive scalar types.
//!
//! `bool` is deliberately **not** a subtype of `int`: the matcher in
//! [`crate::typespec`] treats them as distinct primitives even though both
//! are backed by small integers at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A primitive scalar type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// UTF-8 string.
    Str,
    /// Calendar date (no time-of-day).
    Date,
    /// A clinical code value (see [`crate::code::CodeSystem`]).
    Code,
}

impl Primitive {
    /// The canonical lowercase name, as used in error messages and the
    /// serialized QM shape.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Date => "date",
            Self::Code => "code",
        }
    }

    /// Whether values of this type support a total order (and thus can be
    /// used directly as a sort key without remapping — see the boolean
    /// sort-key wrapping rule in spec §4.4).
    pub fn sorts_natively(&self) -> bool {
        !matches!(self, Self::Bool)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Primitive {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Bool),
            "int" | "integer" => Ok(Self::Int),
            "float" | "double" => Ok(Self::Float),
            "str" | "string" => Ok(Self::Str),
            "date" => Ok(Self::Date),
            "code" => Ok(Self::Code),
            other => Err(format!("unknown primitive type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_not_int() {
        assert_ne!(Primitive::Bool, Primitive::Int);
        assert!(!Primitive::Bool.sorts_natively());
        assert!(Primitive::Int.sorts_natively());
    }

    #[test]
    fn round_trips_through_str() {
        for p in [
            Primitive::Bool,
            Primitive::Int,
            Primitive::Float,
            Primitive::Str,
            Primitive::Date,
            Primitive::Code,
        ] {
            assert_eq!(p.as_str().parse::<Primitive>().unwrap(), p);
        }
    }
}
