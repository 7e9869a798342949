//! Step pipeline
//!
//! An ordered, validated list of steps. Construction rejects duplicates and empty
//! pipelines; execution runs each step once, in order, and stops at the first failure.

use crate::cancel::ensure_active;
use crate::context::TransitionContext;
use crate::steps::TransitionStep;
use segue_core::TransitionError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Pipeline construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineBuildError {
    #[error("step '{0}' is already in the pipeline")]
    DuplicateStep(&'static str),

    #[error("pipeline has no steps")]
    Empty,
}

/// Builds a [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<Box<dyn TransitionStep>>,
}

impl PipelineBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; its name must be unique
    pub fn push(&mut self, step: impl TransitionStep + 'static) -> Result<&mut Self, PipelineBuildError> {
        self.push_boxed(Box::new(step))
    }

    /// Append an already boxed step
    pub fn push_boxed(&mut self, step: Box<dyn TransitionStep>) -> Result<&mut Self, PipelineBuildError> {
        let name = step.name();
        if self.steps.iter().any(|existing| existing.name() == name) {
            return Err(PipelineBuildError::DuplicateStep(name));
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Finish; fails if empty
    pub fn build(self) -> Result<Pipeline, PipelineBuildError> {
        if self.steps.is_empty() {
            return Err(PipelineBuildError::Empty);
        }
        Ok(Pipeline { steps: self.steps })
    }
}

/// What a successful run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub steps_executed: usize,
    pub elapsed: Duration,
}

/// A step failed (or the run was canceled before it started)
#[derive(Debug, thiserror::Error)]
#[error("step '{step}' failed: {error}")]
pub struct StepFailure {
    /// Step that raised the failure
    pub step: &'static str,
    /// Steps that completed before it
    pub completed: usize,
    #[source]
    pub error: TransitionError,
}

/// Validated, ordered step list
pub struct Pipeline {
    steps: Vec<Box<dyn TransitionStep>>,
}

impl Pipeline {
    /// Step names in execution order
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order; checks cancellation before each one
    pub async fn run(
        &self,
        ctx: &mut TransitionContext,
        cancel: &CancellationToken,
    ) -> Result<PipelineSummary, StepFailure> {
        let started = Instant::now();
        for (completed, step) in self.steps.iter().enumerate() {
            let name = step.name();
            let fail = |error| StepFailure {
                step: name,
                completed,
                error,
            };

            ensure_active(cancel, format!("before step '{name}'")).map_err(fail)?;
            let span = tracing::debug_span!("step", name);
            step.execute(ctx, cancel).instrument(span).await.map_err(|error| {
                tracing::warn!("Step {} failed: {}", name, error);
                fail(error)
            })?;
        }
        Ok(PipelineSummary {
            steps_executed: self.steps.len(),
            elapsed: started.elapsed(),
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("steps", &self.step_names()).finish()
    }
}
