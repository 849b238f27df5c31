//! Per-column type/nullability/range inference over compiled QM
//! expressions (spec §4.9), consumed by file writers for dictionary
//! and category encoding.

mod spec;

pub use spec::{ColumnSpec, infer};
