//! Scene transition orchestrator
//!
//! Owns the event bus, the view-model and the spill container, and turns a request
//! into one (or, with fallback, two) pipeline runs:
//!
//! 1. Build the context and the pipeline for the request
//! 2. Record the active scene, prepare the spill container
//! 3. Run the pipeline
//! 4. Execute the cleanup plan under a detached, time-bounded token
//! 5. On failure, resolve the recovery policy and maybe run the fallback
//!
//! Only one run may be in flight at a time; a concurrent `run` is rejected with
//! [`OrchestratorError::Busy`].

use crate::anti_spill::AntiSpill;
use crate::cache::ContentCache;
use crate::cleanup::CleanupReport;
use crate::context::{Collaborators, StatusEmitter, TransitionContext};
use crate::events::{Subscription, TransitionEventBus};
use crate::pipeline::{Pipeline, PipelineBuildError, PipelineBuilder};
use crate::steps::{
    ActivateDestinationStep, BlockInputStep, CleanCacheStep, EntryFadeStep, ExitFadeStep,
    GateWaitStep, LoadDestinationStep, ShowLoadingScreenStep, UnblockInputStep,
    UnloadLoadingScreenStep, UnloadOriginStep,
};
use crate::view_model::{RecoveryAction, TransitionViewModel};
use parking_lot::Mutex;
use segue_core::{
    CacheClearMode, CacheEngine, CacheKeyResolver, FailureCode, FailureNotice, FailurePolicy, Gate,
    RecoveryPolicy, SceneGraph, SceneHandle, SceneKey, SceneLoader, SegueConfig, TransitionError,
    TransitionEvents, TransitionId, TransitionRequest, TransitionStatus,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A completed transition
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub id: TransitionId,
    /// Scene the run ended in
    pub destination: SceneKey,
    pub handle: SceneHandle,
    /// Set when the original destination failed and the fallback succeeded
    pub fell_back_from: Option<FallbackOrigin>,
    pub steps_executed: usize,
    pub elapsed: Duration,
    pub cleanup: CleanupReport,
}

/// Why a successful run is not at its original destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOrigin {
    pub destination: SceneKey,
    pub code: FailureCode,
    pub message: String,
}

/// A failed transition, after any fallback attempt
#[derive(Debug)]
pub struct TransitionFailure {
    pub id: TransitionId,
    pub destination: SceneKey,
    /// Step that raised the failure
    pub step: &'static str,
    pub error: TransitionError,
    /// Policy surfaced to the presentation layer
    pub policy: RecoveryPolicy,
    /// The fallback attempt, if one was made and also failed
    pub fallback: Option<Box<TransitionFailure>>,
    pub steps_executed: usize,
    pub cleanup: CleanupReport,
}

impl TransitionFailure {
    /// Code surfaced to observers: the primary failure's, unless the fallback was canceled
    #[must_use]
    pub fn surfaced_code(&self) -> FailureCode {
        match &self.fallback {
            Some(fallback) if fallback.error.is_canceled() => FailureCode::Canceled,
            _ => self.error.code(),
        }
    }
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a transition is already in flight")]
    Busy,

    #[error("invalid pipeline: {0}")]
    Pipeline(#[from] PipelineBuildError),

    #[error("transition to '{}' failed at step '{}': {}", .0.destination, .0.step, .0.error)]
    Failed(Box<TransitionFailure>),

    #[error("clearing cached content failed: {0}")]
    Cache(#[source] TransitionError),
}

impl OrchestratorError {
    /// Failure details, when a run actually failed
    #[must_use]
    pub fn failure(&self) -> Option<&TransitionFailure> {
        match self {
            OrchestratorError::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Surfaced failure code, when there is one
    #[must_use]
    pub fn code(&self) -> Option<FailureCode> {
        match self {
            OrchestratorError::Failed(failure) => Some(failure.surfaced_code()),
            OrchestratorError::Cache(error) => Some(error.code()),
            _ => None,
        }
    }
}

/// Builds a [`SceneTransitionOrchestrator`]
pub struct OrchestratorBuilder {
    collaborators: Collaborators,
    config: SegueConfig,
}

impl OrchestratorBuilder {
    /// Activation gate collaborator
    #[inline]
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.collaborators.gate = Some(gate);
        self
    }

    /// Content cache engine
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, engine: Arc<dyn CacheEngine>) -> Self {
        self.collaborators.cache = Some(ContentCache::new(engine));
        self
    }

    /// Configuration (defaults otherwise)
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: SegueConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> SceneTransitionOrchestrator {
        let bus = TransitionEventBus::new();
        let view_model = TransitionViewModel::new(self.config.progress_smoothing);
        let view_binding = view_model.bind(&bus);
        let anti_spill = AntiSpill::new(self.collaborators.scenes.clone(), &self.config.anti_spill);
        SceneTransitionOrchestrator {
            collaborators: self.collaborators,
            config: self.config,
            bus,
            view_model,
            _view_binding: view_binding,
            anti_spill: Mutex::new(Some(anti_spill)),
            busy: AtomicBool::new(false),
        }
    }
}

/// Sequences scene transitions
pub struct SceneTransitionOrchestrator {
    collaborators: Collaborators,
    config: SegueConfig,
    bus: TransitionEventBus,
    view_model: Arc<TransitionViewModel>,
    _view_binding: Subscription,
    anti_spill: Mutex<Option<AntiSpill>>,
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SceneTransitionOrchestrator {
    /// Start building over an engine's loader and scene graph
    #[must_use]
    pub fn builder(loader: Arc<dyn SceneLoader>, scenes: Arc<dyn SceneGraph>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            collaborators: Collaborators::new(loader, scenes),
            config: SegueConfig::default(),
        }
    }

    /// Bus every run publishes to
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &TransitionEventBus {
        &self.bus
    }

    #[inline]
    #[must_use]
    pub fn view_model(&self) -> &Arc<TransitionViewModel> {
        &self.view_model
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SegueConfig {
        &self.config
    }

    /// Whether a run is in flight
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Request toward `destination` carrying the configured defaults
    #[must_use]
    pub fn request(&self, destination: impl Into<SceneKey>) -> TransitionRequest {
        self.config.request(destination)
    }

    /// Steps a request runs, in order
    pub fn pipeline_for(&self, request: &TransitionRequest) -> Result<Pipeline, PipelineBuildError> {
        let mut builder = PipelineBuilder::new();
        builder.push(BlockInputStep)?.push(EntryFadeStep)?;
        if request.show_loading_screen {
            builder.push(ShowLoadingScreenStep)?;
        }
        builder.push(UnloadOriginStep)?.push(LoadDestinationStep)?;
        if request.waits_for_gate() {
            builder.push(GateWaitStep)?;
        }
        if request.cache_clear_mode != CacheClearMode::None {
            builder.push(CleanCacheStep)?;
        }
        builder
            .push(ActivateDestinationStep)?
            .push(ExitFadeStep)?
            .push(UnblockInputStep)?;
        if request.show_loading_screen {
            builder.push(UnloadLoadingScreenStep)?;
        }
        builder.build()
    }

    /// Run a transition, falling back when the request and policy allow it
    pub async fn run(
        &self,
        request: TransitionRequest,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or(OrchestratorError::Busy)?;
        self.run_held(&guard, request, cancel).await
    }

    async fn run_held(
        &self,
        _guard: &BusyGuard<'_>,
        request: TransitionRequest,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let request = Arc::new(request);
        let pipeline = self.pipeline_for(&request)?;

        let mut failure = match self.attempt(request.clone(), &pipeline, cancel).await {
            Ok(outcome) => return Ok(outcome),
            Err(failure) => failure,
        };

        let policy = FailurePolicy::get(failure.error.code());
        if policy.do_fallback && !failure.error.is_canceled() {
            if let Some(fallback) = request.redirected_to_fallback() {
                tracing::info!(
                    "Falling back from {} to {} after {}",
                    request.destination,
                    fallback.destination,
                    failure.error.code()
                );
                let fallback_pipeline = self.pipeline_for(&fallback)?;
                match self.attempt(Arc::new(fallback), &fallback_pipeline, cancel).await {
                    Ok(mut outcome) => {
                        outcome.fell_back_from = Some(FallbackOrigin {
                            destination: failure.destination.clone(),
                            code: failure.error.code(),
                            message: failure.error.message().to_string(),
                        });
                        return Ok(outcome);
                    }
                    Err(fallback_failure) => failure.fallback = Some(Box::new(fallback_failure)),
                }
            }
        }

        let code = failure.surfaced_code();
        failure.policy = FailurePolicy::get(code);
        let notice = FailureNotice {
            code,
            message: failure.error.message().to_string(),
            policy: failure.policy,
        };
        tracing::warn!("Transition to {} failed: {}", failure.destination, failure.error);
        self.bus.failed(&notice);
        if let Some(events) = &request.events {
            events.failed(&notice);
        }
        Err(OrchestratorError::Failed(Box::new(failure)))
    }

    /// Run the same request again from the top
    pub async fn retry(
        &self,
        request: TransitionRequest,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or(OrchestratorError::Busy)?;
        self.view_model.hide_recovery();
        self.run_held(&guard, request, cancel).await
    }

    /// Clear cached content for the request's destination, then retry
    pub async fn clear_cache_and_retry(
        &self,
        request: TransitionRequest,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or(OrchestratorError::Busy)?;
        match &self.collaborators.cache {
            Some(cache) => {
                let label = CacheKeyResolver::resolve_scene(&request.destination, request.cache_label.as_deref());
                cache.clear_label(label, cancel).await.map_err(OrchestratorError::Cache)?;
            }
            None => tracing::warn!("Clear-cache requested without a content cache; retrying anyway"),
        }
        self.view_model.hide_recovery();
        self.run_held(&guard, request, cancel).await
    }

    /// Dispatch a recovery action raised by the view-model
    pub async fn handle_action(
        &self,
        action: RecoveryAction,
        request: TransitionRequest,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, OrchestratorError> {
        match action {
            RecoveryAction::Retry => self.retry(request, cancel).await,
            RecoveryAction::ClearCache => self.clear_cache_and_retry(request, cancel).await,
        }
    }

    async fn attempt(
        &self,
        request: Arc<TransitionRequest>,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, TransitionFailure> {
        let id = TransitionId::new();
        let span = tracing::info_span!("transition", %id, destination = %request.destination);
        self.attempt_inner(id, request, pipeline, cancel).instrument(span).await
    }

    async fn attempt_inner(
        &self,
        id: TransitionId,
        request: Arc<TransitionRequest>,
        pipeline: &Pipeline,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, TransitionFailure> {
        let started = Instant::now();
        tracing::info!("Transition started: {} -> {}", id, request.destination);

        let mut sinks: Vec<Arc<dyn TransitionEvents>> = vec![Arc::new(self.bus.clone())];
        if let Some(events) = &request.events {
            sinks.push(events.clone());
        }
        let mut ctx = TransitionContext::new(
            id,
            request.clone(),
            self.collaborators.clone(),
            &self.config.loading_screen,
            StatusEmitter::new(sinks),
        );
        let spill = self.anti_spill.lock().take();
        if let Some(spill) = spill {
            ctx.attach_anti_spill(spill);
        }
        ctx.emit(TransitionStatus::LoadStarted);

        let result = match ctx.begin() {
            Ok(()) => pipeline.run(&mut ctx, cancel).await,
            Err(error) => Err(crate::pipeline::StepFailure {
                step: "begin",
                completed: 0,
                error,
            }),
        };

        let cleanup = self.cleanup(&mut ctx).await;
        let spill = ctx.take_anti_spill();
        *self.anti_spill.lock() = spill;

        let result = result.and_then(|summary| match ctx.destination().cloned() {
            Some(handle) => Ok((summary, handle)),
            None => Err(crate::pipeline::StepFailure {
                step: "complete",
                completed: summary.steps_executed,
                error: TransitionError::new(
                    FailureCode::InitializationCrashed,
                    "pipeline finished without a destination",
                ),
            }),
        });

        match result {
            Ok((summary, handle)) => {
                ctx.emit(TransitionStatus::Complete);
                tracing::info!("Transition complete: {} in {:?}", handle, started.elapsed());
                Ok(TransitionOutcome {
                    id,
                    destination: request.destination.clone(),
                    handle,
                    fell_back_from: None,
                    steps_executed: summary.steps_executed,
                    elapsed: started.elapsed(),
                    cleanup,
                })
            }
            Err(failed) => {
                ctx.emit(TransitionStatus::Failed);
                tracing::warn!("Step {} failed with {}", failed.step, failed.error.code());
                Err(TransitionFailure {
                    id,
                    destination: request.destination.clone(),
                    step: failed.step,
                    policy: FailurePolicy::get(failed.error.code()),
                    error: failed.error,
                    fallback: None,
                    steps_executed: failed.completed,
                    cleanup,
                })
            }
        }
    }

    /// Execute the context's cleanup plan with a fresh token, bounded by the cleanup timeout
    async fn cleanup(&self, ctx: &mut TransitionContext) -> CleanupReport {
        let plan = ctx.take_plan();
        let token = CancellationToken::new();
        match tokio::time::timeout(self.config.cleanup_timeout, plan.execute(ctx, &token)).await {
            Ok(report) => report,
            Err(_) => {
                token.cancel();
                tracing::warn!("Cleanup did not finish within {:?}", self.config.cleanup_timeout);
                CleanupReport::timed_out()
            }
        }
    }
}

impl fmt::Debug for SceneTransitionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneTransitionOrchestrator")
            .field("collaborators", &self.collaborators)
            .field("config", &self.config)
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SceneSpec, SimulatedWorld};
    use pretty_assertions::assert_eq;
    use segue_core::TransitionTimings;

    fn orchestrator() -> (Arc<SimulatedWorld>, SceneTransitionOrchestrator) {
        let world = SimulatedWorld::new();
        for key in ["menu", "loading", "level-1"] {
            world.define(key, SceneSpec::default());
        }
        world.preload("menu");
        let config = SegueConfig::new().with_timings(TransitionTimings::instant());
        let orchestrator = SceneTransitionOrchestrator::builder(world.clone(), world.clone())
            .with_config(config)
            .build();
        (world, orchestrator)
    }

    #[test]
    fn pipeline_shape_follows_request() {
        let (_world, orchestrator) = orchestrator();

        let plain = orchestrator
            .pipeline_for(&TransitionRequest::new("level-1").with_loading_screen(false))
            .unwrap();
        assert_eq!(
            plain.step_names(),
            vec![
                "block-input",
                "entry-fade",
                "unload-origin",
                "load-destination",
                "activate-destination",
                "exit-fade",
                "unblock-input",
            ]
        );

        let full = orchestrator
            .pipeline_for(
                &TransitionRequest::new("level-1")
                    .with_activation_gate_timeout(Duration::from_secs(1))
                    .with_cache_clear(CacheClearMode::CleanUnused, None),
            )
            .unwrap();
        assert_eq!(
            full.step_names(),
            vec![
                "block-input",
                "entry-fade",
                "show-loading-screen",
                "unload-origin",
                "load-destination",
                "wait-for-gate",
                "clean-cache",
                "activate-destination",
                "exit-fade",
                "unblock-input",
                "unload-loading-screen",
            ]
        );
    }

    #[tokio::test]
    async fn successful_run_lands_on_destination() {
        let (world, orchestrator) = orchestrator();
        let request = orchestrator.request("level-1");

        let outcome = orchestrator.run(request, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.destination.as_str(), "level-1");
        assert_eq!(world.active_key().map(|k| k.to_string()).as_deref(), Some("level-1"));
        assert_eq!(world.loaded_keys(), vec![SceneKey::from("level-1")]);
        assert!(outcome.cleanup.is_clean());
        assert!(!orchestrator.is_busy());
        assert_eq!(orchestrator.view_model().snapshot().status, TransitionStatus::Complete);
    }

    #[tokio::test]
    async fn spill_manager_is_returned_after_each_run() {
        let (world, orchestrator) = orchestrator();
        world.define("level-2", SceneSpec::default());

        orchestrator
            .run(orchestrator.request("level-1"), &CancellationToken::new())
            .await
            .unwrap();
        orchestrator
            .run(orchestrator.request("level-2"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(orchestrator.anti_spill.lock().is_some());
        assert_eq!(world.loaded_keys(), vec![SceneKey::from("level-2")]);
    }

    #[tokio::test]
    async fn failure_without_fallback_surfaces_policy() {
        let (world, orchestrator) = orchestrator();
        world.define("level-1", SceneSpec::default().failing(FailureCode::ServerTimeout, "CDN timeout"));

        let err = orchestrator
            .run(orchestrator.request("level-1"), &CancellationToken::new())
            .await
            .unwrap_err();
        let failure = err.failure().unwrap();

        assert_eq!(failure.step, "load-destination");
        assert_eq!(failure.policy, FailurePolicy::get(FailureCode::ServerTimeout));
        assert!(failure.fallback.is_none());
        let state = orchestrator.view_model().snapshot();
        assert!(state.retry_visible);
        assert!(!state.clear_cache_visible);
    }
}
