use super::TransitionStep;
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{TransitionError, TransitionStatus};
use tokio_util::sync::CancellationToken;

/// Stops UI input for the rest of the run
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockInputStep;

#[async_trait]
impl TransitionStep for BlockInputStep {
    fn name(&self) -> &'static str {
        "block-input"
    }

    async fn execute(&self, ctx: &mut TransitionContext, _cancel: &CancellationToken) -> Result<(), TransitionError> {
        if let Some(blocker) = ctx.request().input_blocker.clone() {
            blocker.block();
            ctx.plan_mut().record_input_blocked(true);
        }
        ctx.emit(TransitionStatus::InputBlocked);
        Ok(())
    }
}

/// Gives input back once the destination is on screen
#[derive(Debug, Default, Clone, Copy)]
pub struct UnblockInputStep;

#[async_trait]
impl TransitionStep for UnblockInputStep {
    fn name(&self) -> &'static str {
        "unblock-input"
    }

    async fn execute(&self, ctx: &mut TransitionContext, _cancel: &CancellationToken) -> Result<(), TransitionError> {
        if let Some(blocker) = ctx.request().input_blocker.clone() {
            blocker.unblock();
            ctx.plan_mut().record_input_blocked(false);
        }
        ctx.emit(TransitionStatus::InputUnblocked);
        Ok(())
    }
}
