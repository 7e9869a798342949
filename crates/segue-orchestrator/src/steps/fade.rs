use super::TransitionStep;
use crate::cancel::{cancellable, sleep};
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{FailureCode, TransitionError, TransitionStatus};
use tokio_util::sync::CancellationToken;

/// Pre-fade delay, fade in, post-fade delay
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryFadeStep;

#[async_trait]
impl TransitionStep for EntryFadeStep {
    fn name(&self) -> &'static str {
        "entry-fade"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        let timings = ctx.request().timings;

        ctx.emit(TransitionStatus::BeforeEntryFade);
        sleep(cancel, timings.before_entry_fade, "before entry fade").await?;

        ctx.emit(TransitionStatus::EntryFade);
        if let Some(fader) = ctx.request().fader.clone() {
            cancellable(cancel, "entry fade", fader.fade_in(timings.entry_fade, cancel))
                .await?
                .map_err(|e| TransitionError::from_collaborator(e, FailureCode::Unknown))?;
        }

        ctx.emit(TransitionStatus::AfterEntryFade);
        sleep(cancel, timings.after_entry_fade, "after entry fade").await
    }
}

/// Fade the overlay away to reveal the destination
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitFadeStep;

#[async_trait]
impl TransitionStep for ExitFadeStep {
    fn name(&self) -> &'static str {
        "exit-fade"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::ExitFade);
        let duration = ctx.request().timings.exit_fade;
        if let Some(fader) = ctx.request().fader.clone() {
            cancellable(cancel, "exit fade", fader.fade_out(duration, cancel))
                .await?
                .map_err(|e| TransitionError::from_collaborator(e, FailureCode::Unknown))?;
        }
        Ok(())
    }
}
