//! Per-run transition context
//!
//! Mutable working state threaded through every step of one run. The request itself
//! is shared and never mutated; everything a step learns goes here.

use crate::anti_spill::AntiSpill;
use crate::cache::ContentCache;
use crate::cleanup::CleanupPlan;
use segue_core::{
    validate_transition, FailureCode, FailureNotice, Gate, LoadingScreenPresenter, SceneGraph,
    SceneHandle, SceneKey, SceneLoader, TransitionError, TransitionEvents, TransitionId,
    TransitionRequest, TransitionStatus,
};
use std::fmt;
use std::sync::Arc;

/// Engine-side collaborators shared by every run of an orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub loader: Arc<dyn SceneLoader>,
    pub scenes: Arc<dyn SceneGraph>,
    pub gate: Option<Arc<dyn Gate>>,
    pub cache: Option<ContentCache>,
}

impl Collaborators {
    /// Loader and scene graph only
    #[must_use]
    pub fn new(loader: Arc<dyn SceneLoader>, scenes: Arc<dyn SceneGraph>) -> Self {
        Self {
            loader,
            scenes,
            gate: None,
            cache: None,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("gate", &self.gate.is_some())
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Publishes statuses in order to every sink.
///
/// An out-of-order status is logged and dropped (a panic under `strict-debug`).
pub struct StatusEmitter {
    sinks: Vec<Arc<dyn TransitionEvents>>,
    last: TransitionStatus,
}

impl StatusEmitter {
    /// Emitter over the given sinks
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn TransitionEvents>>) -> Self {
        Self {
            sinks,
            last: TransitionStatus::None,
        }
    }

    /// Last status that went out
    #[inline]
    #[must_use]
    pub fn last(&self) -> TransitionStatus {
        self.last
    }

    /// Sinks, for callbacks that outlive a borrow of the context
    #[inline]
    #[must_use]
    pub fn sinks(&self) -> &[Arc<dyn TransitionEvents>] {
        &self.sinks
    }

    /// Publish a status; returns whether it was accepted
    pub fn emit(&mut self, status: TransitionStatus) -> bool {
        if let Err(e) = validate_transition(self.last, status) {
            tracing::warn!("Dropping status: {}", e);
            return false;
        }
        tracing::debug!("Status: {}", status);
        self.last = status;
        for sink in &self.sinks {
            sink.emit(status);
        }
        true
    }

    /// Publish realtime progress
    pub fn progress(&self, value: f32) {
        for sink in &self.sinks {
            sink.progress(value);
        }
    }

    /// Publish the failure of the run
    pub fn failed(&self, notice: &FailureNotice) {
        for sink in &self.sinks {
            sink.failed(notice);
        }
    }
}

impl fmt::Debug for StatusEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusEmitter")
            .field("sinks", &self.sinks.len())
            .field("last", &self.last)
            .finish()
    }
}

/// Working state of one run
pub struct TransitionContext {
    id: TransitionId,
    request: Arc<TransitionRequest>,
    collaborators: Collaborators,
    loading_screen_key: SceneKey,
    presenter: Option<Arc<dyn LoadingScreenPresenter>>,
    destination: Option<SceneHandle>,
    anti_spill: Option<AntiSpill>,
    emitter: StatusEmitter,
    plan: CleanupPlan,
}

impl TransitionContext {
    /// Start a context. The loading-screen key is the request override or `default_loading_screen`.
    #[must_use]
    pub fn new(
        id: TransitionId,
        request: Arc<TransitionRequest>,
        collaborators: Collaborators,
        default_loading_screen: &SceneKey,
        emitter: StatusEmitter,
    ) -> Self {
        let loading_screen_key = request
            .loading_screen_override
            .clone()
            .unwrap_or_else(|| default_loading_screen.clone());
        Self {
            id,
            request,
            collaborators,
            loading_screen_key,
            presenter: None,
            destination: None,
            anti_spill: None,
            emitter,
            plan: CleanupPlan::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TransitionId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn request(&self) -> &TransitionRequest {
        &self.request
    }

    #[inline]
    #[must_use]
    pub fn loader(&self) -> &Arc<dyn SceneLoader> {
        &self.collaborators.loader
    }

    #[inline]
    #[must_use]
    pub fn scenes(&self) -> &Arc<dyn SceneGraph> {
        &self.collaborators.scenes
    }

    #[inline]
    #[must_use]
    pub fn gate(&self) -> Option<&Arc<dyn Gate>> {
        self.collaborators.gate.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&ContentCache> {
        self.collaborators.cache.as_ref()
    }

    /// Loading screen this run uses
    #[inline]
    #[must_use]
    pub fn loading_screen_key(&self) -> &SceneKey {
        &self.loading_screen_key
    }

    #[inline]
    #[must_use]
    pub fn presenter(&self) -> Option<&Arc<dyn LoadingScreenPresenter>> {
        self.presenter.as_ref()
    }

    pub fn set_presenter(&mut self, presenter: Option<Arc<dyn LoadingScreenPresenter>>) {
        self.presenter = presenter;
    }

    /// Loaded destination, once the load step succeeded
    #[inline]
    #[must_use]
    pub fn destination(&self) -> Option<&SceneHandle> {
        self.destination.as_ref()
    }

    /// Record the loaded destination; a second call is a wiring fault
    pub fn set_destination(&mut self, handle: SceneHandle) -> Result<(), TransitionError> {
        if let Some(existing) = &self.destination {
            return Err(TransitionError::new(
                FailureCode::InitializationCrashed,
                format!("destination already set to {existing}, refusing {handle}"),
            ));
        }
        self.plan.record_destination(handle.clone());
        self.destination = Some(handle);
        Ok(())
    }

    /// Hand the spill manager to this run
    pub fn attach_anti_spill(&mut self, anti_spill: AntiSpill) {
        self.anti_spill = Some(anti_spill);
    }

    #[inline]
    #[must_use]
    pub fn anti_spill(&self) -> Option<&AntiSpill> {
        self.anti_spill.as_ref()
    }

    #[inline]
    pub fn anti_spill_mut(&mut self) -> Option<&mut AntiSpill> {
        self.anti_spill.as_mut()
    }

    /// Give the spill manager back at the end of the run
    pub fn take_anti_spill(&mut self) -> Option<AntiSpill> {
        self.anti_spill.take()
    }

    /// Remember the active scene and open the spill container when the request asks for it
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        let previous = self.scenes().active_scene();
        self.plan.record_previous_active(previous);

        if !self.request.anti_spill {
            return Ok(());
        }
        let name = self.request.anti_spill_name.clone();
        if let Some(spill) = self.anti_spill.as_mut() {
            spill.prepare(name.as_deref())?;
            self.plan.record_anti_spill_prepared(true);
        }
        Ok(())
    }

    /// Publish a status
    #[inline]
    pub fn emit(&mut self, status: TransitionStatus) -> bool {
        self.emitter.emit(status)
    }

    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &StatusEmitter {
        &self.emitter
    }

    #[inline]
    #[must_use]
    pub fn plan(&self) -> &CleanupPlan {
        &self.plan
    }

    #[inline]
    pub fn plan_mut(&mut self) -> &mut CleanupPlan {
        &mut self.plan
    }

    /// Move the plan out for execution; the context keeps an empty one
    pub fn take_plan(&mut self) -> CleanupPlan {
        std::mem::take(&mut self.plan)
    }
}

impl fmt::Debug for TransitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionContext")
            .field("id", &self.id)
            .field("destination_key", &self.request.destination)
            .field("loading_screen_key", &self.loading_screen_key)
            .field("destination", &self.destination)
            .field("anti_spill", &self.anti_spill)
            .field("emitter", &self.emitter)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SceneSpec, SimulatedWorld};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Seen(Mutex<Vec<TransitionStatus>>);

    impl TransitionEvents for Seen {
        fn emit(&self, status: TransitionStatus) {
            self.0.lock().push(status);
        }
    }

    fn context(request: TransitionRequest) -> (Arc<SimulatedWorld>, TransitionContext) {
        let world = SimulatedWorld::new();
        world.define("menu", SceneSpec::default());
        world.preload("menu");
        let collaborators = Collaborators::new(world.clone(), world.clone());
        let ctx = TransitionContext::new(
            TransitionId::new(),
            Arc::new(request),
            collaborators,
            &SceneKey::from("loading"),
            StatusEmitter::new(Vec::new()),
        );
        (world, ctx)
    }

    #[test]
    fn emitter_drops_out_of_order() {
        let seen = Arc::new(Seen::default());
        let mut emitter = StatusEmitter::new(vec![seen.clone()]);

        assert!(emitter.emit(TransitionStatus::LoadStarted));
        assert!(emitter.emit(TransitionStatus::EntryFade));
        #[cfg(not(feature = "strict-debug"))]
        assert!(!emitter.emit(TransitionStatus::InputBlocked));
        assert!(emitter.emit(TransitionStatus::Failed));

        #[cfg(not(feature = "strict-debug"))]
        assert_eq!(
            *seen.0.lock(),
            vec![TransitionStatus::LoadStarted, TransitionStatus::EntryFade, TransitionStatus::Failed]
        );
    }

    #[test]
    fn destination_set_once() {
        let (_world, mut ctx) = context(TransitionRequest::new("level-1"));
        ctx.set_destination(SceneHandle::new(1, "level-1".into())).unwrap();

        let err = ctx.set_destination(SceneHandle::new(2, "level-1".into())).unwrap_err();
        assert_eq!(err.code(), FailureCode::InitializationCrashed);
        assert_eq!(ctx.destination().map(SceneHandle::id), Some(1));
        assert!(ctx.plan().destination_loaded());
    }

    #[test]
    fn loading_screen_override_wins() {
        let (_world, ctx) = context(TransitionRequest::new("level-1").with_loading_screen_override("tunnel"));
        assert_eq!(ctx.loading_screen_key().as_str(), "tunnel");

        let (_world, ctx) = context(TransitionRequest::new("level-1"));
        assert_eq!(ctx.loading_screen_key().as_str(), "loading");
    }

    #[test]
    fn begin_records_previous_and_prepares_spill() {
        let (world, mut ctx) =
            context(TransitionRequest::new("level-1").with_anti_spill(true, Some("spill".into())));
        let menu = world.active_scene().unwrap();
        ctx.attach_anti_spill(AntiSpill::new(world.clone(), &segue_core::AntiSpillConfig::default()));

        ctx.begin().unwrap();

        assert_eq!(ctx.plan().previous_active(), Some(&menu));
        assert!(ctx.plan().anti_spill_prepared());
        assert_eq!(world.active_key().unwrap().as_str(), "spill");
    }
}
