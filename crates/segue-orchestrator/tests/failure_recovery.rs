//! Failure handling: cancellation, gate timeouts, fallback and user recovery

use pretty_assertions::assert_eq;
use segue_core::{FailureCode, FailurePolicy, SceneKey, SegueConfig, TransitionStatus};
use segue_orchestrator::simulator::{InjectedFailure, SceneSpec, SimulatedGate, WorldEvent};
use segue_orchestrator::{MokaContentCache, OrchestratorError, RecoveryAction, SceneTransitionOrchestrator};
use segue_test_utils::{
    assert_status_order, instant_config, orchestrator_with, setup_orchestrator, standard_world,
    RecordingEvents, RecordingUi,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn key(name: &str) -> SceneKey {
    SceneKey::from(name)
}

fn download_failure(message: &str) -> InjectedFailure {
    InjectedFailure::Typed {
        code: FailureCode::ContentDownloadFailed,
        message: message.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_origin_unload_restores_the_origin() {
    let world = standard_world();
    world.define("menu", SceneSpec::default().with_unload_time(Duration::from_millis(500)));
    let orchestrator = setup_orchestrator(&world);
    let events = RecordingEvents::new();
    let request = orchestrator
        .request("level-1")
        .with_fallback("main-menu")
        .with_events(events.clone());
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        }
    };
    let (result, ()) = tokio::join!(orchestrator.run(request, &cancel), canceller);

    let err = result.unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.error.code(), FailureCode::Canceled);
    assert_eq!(failure.step, "unload-origin");
    assert!(failure.fallback.is_none(), "cancellation never falls back");
    assert_eq!(failure.policy, FailurePolicy::get(FailureCode::Canceled));

    assert_eq!(world.active_key(), Some(key("menu")));
    assert_eq!(world.loaded_keys(), vec![key("menu")]);
    assert_eq!(world.count_loaded(&key("main-menu")), 0);
    assert!(failure.cleanup.restored_active);
    assert!(failure.cleanup.discarded_anti_spill);
    assert!(failure.cleanup.unloaded_loading_screen);

    let statuses = events.statuses();
    assert_status_order(&statuses);
    assert_eq!(statuses.last(), Some(&TransitionStatus::Failed));
    assert_eq!(events.failures().len(), 1);
    assert_eq!(events.failures()[0].code, FailureCode::Canceled);

    let state = orchestrator.view_model().snapshot();
    assert!(!state.retry_visible);
    assert!(!state.clear_cache_visible);
}

#[tokio::test(start_paused = true)]
async fn test_silent_gate_times_out_after_the_limit() {
    let world = standard_world();
    let orchestrator = SceneTransitionOrchestrator::builder(world.clone(), world.clone())
        .with_gate(Arc::new(SimulatedGate::never()))
        .with_config(instant_config())
        .build();
    let request = orchestrator
        .request("level-1")
        .with_activation_gate_timeout(Duration::from_millis(5000));
    let started = tokio::time::Instant::now();

    let err = orchestrator.run(request, &CancellationToken::new()).await.unwrap_err();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(5000) && elapsed < Duration::from_millis(5100), "{elapsed:?}");
    let failure = err.failure().unwrap();
    assert_eq!(failure.step, "wait-for-gate");
    assert_eq!(failure.error.code(), FailureCode::ServerTimeout);
    assert!(failure.error.message().contains("5000ms"), "{}", failure.error);
    assert!(failure.cleanup.unloaded_destination);
    assert_eq!(world.count_loaded(&key("level-1")), 0);

    let state = orchestrator.view_model().snapshot();
    assert!(state.retry_visible);
    assert!(!state.clear_cache_visible);
    assert_eq!(state.failure_code, Some(FailureCode::ServerTimeout));
}

#[tokio::test]
async fn test_rejecting_gate_classifies_as_server_rejected() {
    let world = standard_world();
    let orchestrator = SceneTransitionOrchestrator::builder(world.clone(), world.clone())
        .with_gate(Arc::new(SimulatedGate::reject("403 Forbidden")))
        .with_config(instant_config())
        .build();
    let request = orchestrator
        .request("level-1")
        .with_activation_gate_timeout(Duration::from_secs(5));

    let err = orchestrator.run(request, &CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.code(), Some(FailureCode::ServerRejected));
    assert!(!orchestrator.view_model().snapshot().retry_visible);
}

#[tokio::test]
async fn test_fallback_lands_on_the_fallback_destination() {
    let world = standard_world();
    world.set_failure(&key("level-1"), Some(download_failure("CDN 502")));
    let orchestrator = setup_orchestrator(&world);
    let events = RecordingEvents::new();
    let request = orchestrator
        .request("level-1")
        .with_fallback("main-menu")
        .with_events(events.clone());

    let outcome = orchestrator.run(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.destination, key("main-menu"));
    let origin = outcome.fell_back_from.unwrap();
    assert_eq!(origin.destination, key("level-1"));
    assert_eq!(origin.code, FailureCode::ContentDownloadFailed);
    assert_eq!(world.active_key(), Some(key("main-menu")));
    assert_eq!(world.count_loaded(&key("level-1")), 0);

    let statuses = events.statuses();
    let split = statuses.iter().position(|s| *s == TransitionStatus::Failed).unwrap();
    assert_status_order(&statuses[..=split]);
    assert_status_order(&statuses[split + 1..]);
    assert_eq!(statuses.last(), Some(&TransitionStatus::Complete));
    assert!(events.failures().is_empty());
}

#[tokio::test]
async fn test_failed_fallback_surfaces_primary_policy() {
    let world = standard_world();
    world.set_failure(&key("level-1"), Some(download_failure("CDN 502")));
    world.set_failure(&key("main-menu"), Some(download_failure("CDN 503")));
    let orchestrator = setup_orchestrator(&world);
    let events = RecordingEvents::new();
    let request = orchestrator
        .request("level-1")
        .with_fallback("main-menu")
        .with_events(events.clone());

    let err = orchestrator.run(request, &CancellationToken::new()).await.unwrap_err();

    let failure = err.failure().unwrap();
    assert_eq!(failure.destination, key("level-1"));
    let fallback = failure.fallback.as_ref().expect("fallback attempted");
    assert_eq!(fallback.destination, key("main-menu"));
    assert!(fallback.fallback.is_none(), "fallback never chains");
    assert_eq!(failure.surfaced_code(), FailureCode::ContentDownloadFailed);

    assert_eq!(events.failures().len(), 1);
    let notice = &events.failures()[0];
    assert_eq!(notice.code, FailureCode::ContentDownloadFailed);
    assert_eq!(notice.policy.ui_message_key, "transition.error.content_download_failed");

    let state = orchestrator.view_model().snapshot();
    assert_eq!(state.status, TransitionStatus::Failed);
    assert!(state.retry_visible);
    assert!(state.clear_cache_visible);
    assert_eq!(state.status_text, "transition.error.content_download_failed");
}

#[tokio::test]
async fn test_disabled_fallback_is_not_attempted() {
    let world = standard_world();
    world.set_failure(&key("level-1"), Some(download_failure("CDN 502")));
    let orchestrator = setup_orchestrator(&world);
    let request = orchestrator
        .request("level-1")
        .with_fallback("main-menu")
        .with_fallback_enabled(false);

    let err = orchestrator.run(request, &CancellationToken::new()).await.unwrap_err();

    assert!(err.failure().unwrap().fallback.is_none());
    let fallback_loaded = world
        .log()
        .iter()
        .any(|event| matches!(event, WorldEvent::LoadStarted { scene, .. } if scene.as_str() == "main-menu"));
    assert!(!fallback_loaded);
}

#[tokio::test]
async fn test_untyped_failure_is_classified() {
    let world = standard_world();
    world.set_failure(
        &key("level-1"),
        Some(InjectedFailure::Untyped {
            message: "connection timed out".to_string(),
        }),
    );
    let orchestrator = setup_orchestrator(&world);

    let err = orchestrator
        .run(orchestrator.request("level-1"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(FailureCode::ServerTimeout));
}

#[tokio::test]
async fn test_activation_crash_unloads_the_destination() {
    let world = standard_world();
    world.define("level-1", SceneSpec::default().with_activation_failure("null reference in Awake"));
    let orchestrator = setup_orchestrator(&world);

    let err = orchestrator
        .run(orchestrator.request("level-1"), &CancellationToken::new())
        .await
        .unwrap_err();

    let failure = err.failure().unwrap();
    assert_eq!(failure.step, "activate-destination");
    assert_eq!(failure.error.code(), FailureCode::InitializationCrashed);
    assert!(failure.cleanup.unloaded_destination);
    assert_eq!(world.count_loaded(&key("level-1")), 0);
}

#[tokio::test]
async fn test_unknown_destination_is_content_not_found() {
    let world = standard_world();
    let orchestrator = setup_orchestrator(&world);

    let err = orchestrator
        .run(orchestrator.request("level-99"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some(FailureCode::ContentNotFound));
    let state = orchestrator.view_model().snapshot();
    assert!(!state.retry_visible);
    assert!(state.clear_cache_visible);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_cleanup_is_bounded() {
    let world = standard_world();
    world.define("level-1", SceneSpec::default().hanging().hanging_unload());
    world.define("loading", SceneSpec::default().hanging_unload());
    let config = instant_config().with_cleanup_timeout(Duration::from_millis(750));
    let orchestrator = orchestrator_with(&world, MokaContentCache::new(8), config);
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    };
    let started = tokio::time::Instant::now();
    let (result, ()) = tokio::join!(orchestrator.run(orchestrator.request("level-1"), &cancel), canceller);

    let failure = result.unwrap_err();
    let failure = failure.failure().unwrap();
    assert!(failure.cleanup.timed_out);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(750) && elapsed < Duration::from_millis(900), "{elapsed:?}");
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_retry_after_transient_failure() {
    let world = standard_world();
    world.set_failure(&key("level-1"), Some(download_failure("CDN 502")));
    let orchestrator = setup_orchestrator(&world);
    let cancel = CancellationToken::new();

    orchestrator
        .run(orchestrator.request("level-1"), &cancel)
        .await
        .unwrap_err();
    assert!(orchestrator.view_model().snapshot().retry_visible);

    world.set_failure(&key("level-1"), None);
    world.preload("menu");
    let outcome = orchestrator.retry(orchestrator.request("level-1"), &cancel).await.unwrap();

    assert_eq!(outcome.destination, key("level-1"));
    let state = orchestrator.view_model().snapshot();
    assert!(!state.retry_visible);
    assert_eq!(state.status, TransitionStatus::Complete);
}

#[tokio::test]
async fn test_clear_cache_and_retry_drops_the_destination_label() {
    let world = standard_world();
    world.set_failure(&key("level-1"), Some(download_failure("corrupt bundle")));
    let cache = MokaContentCache::new(16);
    cache.insert("level-1/terrain", "level-1", &b"stale"[..]).await;
    cache.insert("menu/ui", "menu", &b"ok"[..]).await;
    let orchestrator = orchestrator_with(&world, cache.clone(), instant_config());
    let ui = RecordingUi::new();
    orchestrator.view_model().attach_ui(ui.clone());
    let mut actions = orchestrator.view_model().subscribe_actions();
    let cancel = CancellationToken::new();

    orchestrator
        .run(orchestrator.request("level-1"), &cancel)
        .await
        .unwrap_err();
    assert!(ui.clear_cache_visible());
    assert!(ui.click_clear_cache());
    let action = actions.recv().await.unwrap();
    assert_eq!(action, RecoveryAction::ClearCache);

    world.set_failure(&key("level-1"), None);
    let outcome = orchestrator
        .handle_action(action, orchestrator.request("level-1"), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.destination, key("level-1"));
    assert!(!cache.contains("level-1/terrain"));
    assert!(cache.contains("menu/ui"));
    assert!(!ui.retry_visible());
    assert!(!ui.clear_cache_visible());
}

#[tokio::test]
async fn test_clear_cache_failure_aborts_the_retry() {
    let world = standard_world();
    let cache = MokaContentCache::new(16);
    cache.fail_next("disk full");
    let orchestrator = orchestrator_with(&world, cache, SegueConfig::new());

    let err = orchestrator
        .clear_cache_and_retry(orchestrator.request("level-1"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Cache(_)));
    assert_eq!(err.code(), Some(FailureCode::ContentDownloadFailed));
    assert_eq!(world.active_key(), Some(key("menu")));
}

#[tokio::test(start_paused = true)]
async fn test_clear_cache_while_busy_leaves_the_cache_alone() {
    let world = standard_world();
    world.define("level-1", SceneSpec::default().with_load_time(Duration::from_secs(1)));
    let cache = MokaContentCache::new(16);
    cache.insert("level-1/terrain", "level-1", &b"fresh"[..]).await;
    let orchestrator = orchestrator_with(&world, cache.clone(), instant_config());
    let cancel = CancellationToken::new();

    let running = orchestrator.run(orchestrator.request("level-1"), &cancel);
    let clearing = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = orchestrator
            .clear_cache_and_retry(orchestrator.request("level-1"), &cancel)
            .await;
        (result, cache.contains("level-1/terrain"))
    };
    let (running, (cleared, still_cached)) = tokio::join!(running, clearing);

    running.unwrap();
    assert!(matches!(cleared, Err(OrchestratorError::Busy)));
    assert!(still_cached);
    assert!(cache.contains("level-1/terrain"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_while_busy_is_rejected() {
    let world = standard_world();
    world.define("level-1", SceneSpec::default().with_load_time(Duration::from_secs(1)));
    let orchestrator = setup_orchestrator(&world);
    let cancel = CancellationToken::new();

    let running = orchestrator.run(orchestrator.request("level-1"), &cancel);
    let retrying = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.retry(orchestrator.request("level-2"), &cancel).await
    };
    let (running, retried) = tokio::join!(running, retrying);

    running.unwrap();
    assert!(matches!(retried, Err(OrchestratorError::Busy)));
    assert_eq!(world.count_loaded(&key("level-2")), 0);
}
