//! Pure QM-to-QM rewrite passes (spec §4.4): attach selected columns to
//! row-picks, then stabilize their sort order. Each pass rebuilds the
//! dataset's graphs from scratch and deep-clones the result again
//! afterward, so the hash/equality invariant `ehrql-model` relies on
//! holds for the output exactly as it did for freshly-built input.

mod rewrite;
mod select_columns;
mod stabilize_sort;

mod pipeline;

pub use pipeline::{TransformPipeline, TransformStep, build_default_pipeline};
pub use select_columns::AttachSelectedColumnsStep;
pub use stabilize_sort::StabilizeSortOrderStep;
