//! Ordered pipeline of QM-to-QM rewrite passes (spec §4.4).
//!
//! # Standard pipeline order
//!
//! 1. **AttachSelectedColumnsStep** — record which columns are
//!    projected off each row-pick.
//! 2. **StabilizeSortOrderStep** — add deterministic tie-breaking sort
//!    keys underneath each row-pick's sort chain.
//!
//! ```ignore
//! use ehrql_transform::build_default_pipeline;
//!
//! let pipeline = build_default_pipeline();
//! let transformed = pipeline.run(&dataset)?;
//! ```

use ehrql_builder::{Dataset, Result};

use crate::select_columns::AttachSelectedColumnsStep;
use crate::stabilize_sort::StabilizeSortOrderStep;

/// A single QM-to-QM rewrite pass. Operates on a deep clone so callers
/// observe no mutation of the input dataset (spec §4.4).
pub trait TransformStep: Send + Sync {
    /// Rebuild `dataset`'s graphs, returning a new dataset.
    fn apply(&self, dataset: &Dataset) -> Result<Dataset>;

    /// Human-readable name for this step (for logging).
    fn step_name(&self) -> &str;
}

/// An ordered sequence of transform passes, each fed the previous
/// pass's output.
pub struct TransformPipeline {
    steps: Vec<Box<dyn TransformStep>>,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a step to the end of the pipeline.
    pub fn add_step(mut self, step: Box<dyn TransformStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order, returning the final rebuilt dataset.
    pub fn run(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut current = dataset.clone();
        for step in &self.steps {
            tracing::debug!(step = step.step_name(), "running transform step");
            current = step.apply(&current)?;
        }
        Ok(current)
    }

    /// List step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_name()).collect()
    }
}

/// Build the default transform pipeline: attach selected columns, then
/// stabilize sort order. `ehrql-sql` lowers against this pipeline's
/// output, never against a raw builder dataset.
pub fn build_default_pipeline() -> TransformPipeline {
    TransformPipeline::new().add_step(Box::new(AttachSelectedColumnsStep)).add_step(Box::new(StabilizeSortOrderStep))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_runs_both_steps_in_order() {
        let pipeline = build_default_pipeline();
        assert_eq!(pipeline.step_names(), vec!["attach_selected_columns", "stabilize_sort_order"]);
    }
}
