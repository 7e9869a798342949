use super::TransitionStep;
use crate::cancel::cancellable;
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{FailureCode, LoadMode, LoadOptions, TransitionError, TransitionStatus};
use tokio_util::sync::CancellationToken;

/// Loads the temporary loading screen additively and picks up its presenter
#[derive(Debug, Default, Clone, Copy)]
pub struct ShowLoadingScreenStep;

#[async_trait]
impl TransitionStep for ShowLoadingScreenStep {
    fn name(&self) -> &'static str {
        "show-loading-screen"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        let key = ctx.loading_screen_key().clone();
        let loader = ctx.loader().clone();

        let handle = cancellable(
            cancel,
            "loading screen load",
            loader.load(&key, LoadOptions::new(LoadMode::Additive), cancel),
        )
        .await?
        .map_err(|e| TransitionError::from_collaborator(e, FailureCode::SceneLoadFailed))?;
        tracing::debug!("Loading screen {} up", handle);

        let presenter = loader.loading_screen_presenter(&handle);
        if let Some(presenter) = &presenter {
            presenter.set_progress(0.0);
            presenter.set_message(ctx.request().destination.as_str());
        }
        ctx.set_presenter(presenter);
        ctx.plan_mut().record_loading_screen(handle);
        Ok(())
    }
}

/// Removes the loading screen once the destination is showing
#[derive(Debug, Default, Clone, Copy)]
pub struct UnloadLoadingScreenStep;

#[async_trait]
impl TransitionStep for UnloadLoadingScreenStep {
    fn name(&self) -> &'static str {
        "unload-loading-screen"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::UnloadLoadingScreen);
        let Some(handle) = ctx.plan().loading_screen().cloned() else {
            return Ok(());
        };

        let loader = ctx.loader().clone();
        cancellable(cancel, "loading screen unload", loader.unload(&handle, cancel))
            .await?
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::Unknown))?;

        ctx.set_presenter(None);
        ctx.plan_mut().clear_loading_screen();
        Ok(())
    }
}
