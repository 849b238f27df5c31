#![deny(unsafe_code)]
//! Lowers a transformed ehrQL dataset (spec §4.5) to backend SQL text,
//! and evaluates the same Query Model graph directly in memory for
//! tests that need ground truth without a live database connection.

mod aggregate;
mod ctx;
mod dataset;
mod error;
mod expr;
mod frame;
mod ir;
mod pick;
pub mod reference;

pub use dataset::{LoweredDataset, lower_dataset, lower_variable};
pub use error::{Result, SqlError};
pub use ir::{CompiledVariable, Join, SqlExpr};
