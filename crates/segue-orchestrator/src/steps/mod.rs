//! Transition steps
//!
//! One step per phase of a transition. Steps emit their own statuses, record what
//! they acquire in the cleanup plan, and raise a single classified failure when
//! something goes wrong. None of them retries.

mod activate;
mod cache;
mod fade;
mod gate;
mod input;
mod load;
mod loading_screen;
mod unload;

pub use activate::ActivateDestinationStep;
pub use cache::CleanCacheStep;
pub use fade::{EntryFadeStep, ExitFadeStep};
pub use gate::GateWaitStep;
pub use input::{BlockInputStep, UnblockInputStep};
pub use load::LoadDestinationStep;
pub use loading_screen::{ShowLoadingScreenStep, UnloadLoadingScreenStep};
pub use unload::UnloadOriginStep;

use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::TransitionError;
use tokio_util::sync::CancellationToken;

/// One phase of a transition
#[async_trait]
pub trait TransitionStep: Send + Sync {
    /// Unique name within a pipeline
    fn name(&self) -> &'static str;

    /// Run the phase. Must observe `cancel` at every suspension point.
    async fn execute(
        &self,
        ctx: &mut TransitionContext,
        cancel: &CancellationToken,
    ) -> Result<(), TransitionError>;
}
