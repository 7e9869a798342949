use super::TransitionStep;
use crate::cancel::{cancellable, sleep};
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{FailureCode, TransitionError, TransitionStatus};
use tokio_util::sync::CancellationToken;

/// Makes the destination active, migrates spilled objects into it, then hands it
/// the request's arguments
#[derive(Debug, Default, Clone, Copy)]
pub struct ActivateDestinationStep;

#[async_trait]
impl TransitionStep for ActivateDestinationStep {
    fn name(&self) -> &'static str {
        "activate-destination"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::BeforeSceneActivation);
        let delay = ctx.request().timings.before_activation;
        sleep(cancel, delay, "before activation").await?;

        ctx.emit(TransitionStatus::DestinationSceneActivation);
        let Some(destination) = ctx.destination().cloned() else {
            return Err(TransitionError::new(
                FailureCode::InitializationCrashed,
                "activation reached without a loaded destination",
            ));
        };

        ctx.scenes()
            .set_active_scene(&destination)
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::InitializationCrashed))?;

        if let Some(spill) = ctx.anti_spill_mut() {
            let report = spill.flush_to(&destination, true, cancel).await?;
            let still_prepared = spill.is_prepared();
            if report.moved > 0 {
                tracing::info!("Migrated {} spilled objects into {}", report.moved, destination);
            }
            ctx.plan_mut().record_anti_spill_prepared(still_prepared);
        }

        let loader = ctx.loader().clone();
        cancellable(cancel, "destination activation", loader.activate(&destination, &ctx.request().args))
            .await?
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::InitializationCrashed))?;

        ctx.plan_mut().mark_destination_activated();
        ctx.emit(TransitionStatus::AfterSceneActivation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SceneSpec, WorldEvent};
    use crate::steps::test_support::{context, world};
    use crate::steps::LoadDestinationStep;
    use segue_core::{SceneGraph, TransitionRequest};

    #[tokio::test]
    async fn spilled_objects_end_up_in_destination() {
        let world = world();
        world.define("level-1", SceneSpec::default().with_spawns(3));
        let request = TransitionRequest::new("level-1")
            .with_anti_spill(true, None)
            .with_arg("difficulty", "hard");
        let (mut ctx, recorded) = context(&world, None, request);
        let cancel = CancellationToken::new();
        ctx.begin().unwrap();
        let container = ctx.anti_spill().and_then(|s| s.container().cloned()).unwrap();

        LoadDestinationStep.execute(&mut ctx, &cancel).await.unwrap();
        assert_eq!(world.root_objects(&container).len(), 3);
        ActivateDestinationStep.execute(&mut ctx, &cancel).await.unwrap();

        let destination = ctx.destination().cloned().unwrap();
        assert_eq!(world.active_scene(), Some(destination.clone()));
        assert_eq!(world.root_objects(&destination).len(), 3);
        assert!(!world.is_valid(&container));
        assert!(!ctx.plan().anti_spill_prepared());
        assert!(ctx.plan().destination_activated());
        assert!(world.log().iter().any(|e| matches!(
            e,
            WorldEvent::Activated { scene, args } if scene.as_str() == "level-1" && args.get("difficulty") == Some(&serde_json::json!("hard"))
        )));
        assert_eq!(recorded.statuses.lock().last(), Some(&TransitionStatus::AfterSceneActivation));
    }

    #[tokio::test]
    async fn vanished_spill_container_leaves_destination_active() {
        let world = world();
        let (mut ctx, _recorded) = context(&world, None, TransitionRequest::new("level-1").with_anti_spill(true, None));
        let cancel = CancellationToken::new();
        ctx.begin().unwrap();
        let container = ctx.anti_spill().and_then(|s| s.container().cloned()).unwrap();

        LoadDestinationStep.execute(&mut ctx, &cancel).await.unwrap();
        world.destroy(&container);
        ActivateDestinationStep.execute(&mut ctx, &cancel).await.unwrap();

        let destination = ctx.destination().cloned().unwrap();
        assert_eq!(world.active_scene(), Some(destination));
        assert!(!ctx.plan().anti_spill_prepared());
        assert_eq!(world.loaded_keys(), vec![segue_core::SceneKey::from("menu"), segue_core::SceneKey::from("level-1")]);
    }

    #[tokio::test]
    async fn activation_failure_is_initialization_crash() {
        let world = world();
        world.define("level-1", SceneSpec::default().with_activation_failure("null reference in Awake"));
        let (mut ctx, _recorded) = context(&world, None, TransitionRequest::new("level-1"));
        let cancel = CancellationToken::new();

        LoadDestinationStep.execute(&mut ctx, &cancel).await.unwrap();
        let err = ActivateDestinationStep.execute(&mut ctx, &cancel).await.unwrap_err();

        assert_eq!(err.code(), FailureCode::InitializationCrashed);
        assert!(!ctx.plan().destination_activated());
    }

    #[tokio::test]
    async fn no_destination_is_a_wiring_fault() {
        let world = world();
        let (mut ctx, _recorded) = context(&world, None, TransitionRequest::new("level-1"));
        let err = ActivateDestinationStep
            .execute(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), FailureCode::InitializationCrashed);
    }
}
