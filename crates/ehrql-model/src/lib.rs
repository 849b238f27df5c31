#![deny(unsafe_code)]
//! The ehrQL Query Model: an immutable, strongly typed node graph describing
//! a dataset extraction (spec §3).
//!
//! Every [`node::Node`] is constructed through a validating smart
//! constructor that checks the spec §4.2 invariants (type fit, domain
//! compatibility, operator-specific constraints) before the node comes into
//! existence — an ill-typed Query Model is simply not representable.

pub mod domain;
pub mod error;
pub mod node;

pub use domain::Domain;
pub use error::{ModelError, Result};
pub use node::{Aggregate, CaseArm, Function, FunctionBuilder, Node, NodeRef, Position, ValueLiteral, function};
