#![deny(unsafe_code)]
//! Primitive type system, literals, the type matcher, and table schema
//! metadata shared by every other ehrQL crate.

pub mod code;
pub mod error;
pub mod literal;
pub mod lookup;
pub mod primitive;
pub mod schema;
pub mod typespec;

pub use code::{Code, CodeSystem};
pub use error::{Result, TypesError};
pub use literal::{FiniteFloat, Literal, LiteralSet};
pub use lookup::CaseInsensitiveSet;
pub use primitive::Primitive;
pub use schema::{Column, Constraint, TableSchema};
pub use typespec::{Bindings, TypeSpec, get_typespec_literal, get_typespec_set, match_typespec};
