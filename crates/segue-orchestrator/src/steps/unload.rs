use super::TransitionStep;
use crate::cancel::{cancellable, ensure_active};
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{FailureCode, SceneHandle, TransitionError, TransitionStatus, UnloadPolicy};
use tokio_util::sync::CancellationToken;

/// Unloads origin content according to the request's unload policy.
///
/// Never touches kept scenes, the loading screen or the spill container.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnloadOriginStep;

impl UnloadOriginStep {
    fn targets(ctx: &TransitionContext) -> Vec<SceneHandle> {
        let request = ctx.request();
        let scenes = ctx.scenes();
        let candidates = match request.unload_policy {
            UnloadPolicy::KeepAll => Vec::new(),
            UnloadPolicy::ActiveOnly => ctx.plan().previous_active().cloned().into_iter().collect(),
            UnloadPolicy::AllLoaded => scenes.loaded_scenes(),
        };

        let loading_screen = ctx.plan().loading_screen();
        let container = ctx.anti_spill().and_then(|spill| spill.container());
        candidates
            .into_iter()
            .filter(|scene| scenes.is_valid(scene) && scenes.is_loaded(scene))
            .filter(|scene| !request.keep_scene_names.contains(scene.key()))
            .filter(|scene| Some(scene) != loading_screen)
            .filter(|scene| Some(scene) != container)
            .collect()
    }
}

#[async_trait]
impl TransitionStep for UnloadOriginStep {
    fn name(&self) -> &'static str {
        "unload-origin"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::UnloadOriginScene);
        let targets = Self::targets(ctx);
        let loader = ctx.loader().clone();

        for scene in targets {
            ensure_active(cancel, "origin unload")?;
            tracing::debug!("Unloading origin {}", scene);
            cancellable(cancel, format!("unloading {scene}"), loader.unload(&scene, cancel))
                .await?
                .map_err(|e| TransitionError::from_collaborator(e, FailureCode::SceneLoadFailed))?;
        }
        Ok(())
    }
}
