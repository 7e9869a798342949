use super::TransitionStep;
use crate::cancel::cancellable;
use crate::context::TransitionContext;
use async_trait::async_trait;
use parking_lot::Mutex;
use segue_core::{FailureCode, LoadOptions, ProgressCallback, TransitionError, TransitionStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Loads the destination, streaming progress to observers and the loading screen
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadDestinationStep;

impl LoadDestinationStep {
    /// Fan-out callback plus the last value it forwarded
    fn progress_sink(ctx: &TransitionContext) -> (ProgressCallback, Arc<Mutex<f32>>) {
        let sinks = ctx.emitter().sinks().to_vec();
        let presenter = ctx.presenter().cloned();
        let last = Arc::new(Mutex::new(0.0_f32));
        let seen = last.clone();
        let callback: ProgressCallback = Arc::new(move |value| {
            *seen.lock() = value;
            for sink in &sinks {
                sink.progress(value);
            }
            if let Some(presenter) = &presenter {
                presenter.set_progress(value);
            }
        });
        (callback, last)
    }
}

#[async_trait]
impl TransitionStep for LoadDestinationStep {
    fn name(&self) -> &'static str {
        "load-destination"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::LoadDestinationScene);

        let destination = ctx.request().destination.clone();
        let (progress, last_reported) = Self::progress_sink(ctx);
        let options = LoadOptions::new(ctx.request().load_mode).with_progress(progress.clone());
        let loader = ctx.loader().clone();

        tracing::debug!("Loading destination {} ({:?})", destination, options.mode);
        let handle = cancellable(cancel, format!("loading {destination}"), loader.load(&destination, options, cancel))
            .await?
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::SceneLoadFailed))?;

        ctx.set_destination(handle)?;
        let finished = *last_reported.lock() >= 1.0;
        if !finished {
            progress(1.0);
        }
        ctx.emit(TransitionStatus::LoadProgressComplete);
        Ok(())
    }
}
