//! Testing utilities for the Segue workspace
//!
//! Shared fixtures, recording observers and assertions.

#![allow(missing_docs)]

use parking_lot::Mutex;
use segue_core::{
    FailureNotice, SegueConfig, TransitionEvents, TransitionStatus, TransitionTimings, TransitionUi,
    UiCallback, HAPPY_PATH,
};
use segue_orchestrator::simulator::{SceneSpec, SimulatedGate, SimulatedWorld};
use segue_orchestrator::{MokaContentCache, SceneTransitionOrchestrator};
use std::sync::Arc;

/// Observer that records everything it is told
#[derive(Debug, Default)]
pub struct RecordingEvents {
    statuses: Mutex<Vec<TransitionStatus>>,
    progress: Mutex<Vec<f32>>,
    failures: Mutex<Vec<FailureNotice>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<TransitionStatus> {
        self.statuses.lock().clone()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.progress.lock().clone()
    }

    pub fn failures(&self) -> Vec<FailureNotice> {
        self.failures.lock().clone()
    }
}

impl TransitionEvents for RecordingEvents {
    fn emit(&self, status: TransitionStatus) {
        self.statuses.lock().push(status);
    }

    fn progress(&self, value: f32) {
        self.progress.lock().push(value);
    }

    fn failed(&self, notice: &FailureNotice) {
        self.failures.lock().push(notice.clone());
    }
}

/// Presentation surface that records what it shows, with clickable buttons
#[derive(Default)]
pub struct RecordingUi {
    status: Mutex<String>,
    retry_visible: Mutex<bool>,
    clear_cache_visible: Mutex<bool>,
    on_retry: Mutex<Option<UiCallback>>,
    on_clear_cache: Mutex<Option<UiCallback>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    pub fn retry_visible(&self) -> bool {
        *self.retry_visible.lock()
    }

    pub fn clear_cache_visible(&self) -> bool {
        *self.clear_cache_visible.lock()
    }

    /// Press the retry button; false when nothing is bound
    pub fn click_retry(&self) -> bool {
        let callback = self.on_retry.lock().clone();
        callback.map(|callback| callback()).is_some()
    }

    /// Press the clear-cache button; false when nothing is bound
    pub fn click_clear_cache(&self) -> bool {
        let callback = self.on_clear_cache.lock().clone();
        callback.map(|callback| callback()).is_some()
    }
}

impl TransitionUi for RecordingUi {
    fn set_status(&self, text: &str) {
        *self.status.lock() = text.to_string();
    }

    fn set_retry_visible(&self, visible: bool) {
        *self.retry_visible.lock() = visible;
    }

    fn set_clear_cache_visible(&self, visible: bool) {
        *self.clear_cache_visible.lock() = visible;
    }

    fn bind_retry(&self, on_click: UiCallback) {
        *self.on_retry.lock() = Some(on_click);
    }

    fn bind_clear_cache(&self, on_click: UiCallback) {
        *self.on_clear_cache.lock() = Some(on_click);
    }
}

/// World with `menu` loaded and active, a `loading` screen with a presenter, and
/// `level-1`, `level-2` and `main-menu` declared.
pub fn standard_world() -> Arc<SimulatedWorld> {
    let world = SimulatedWorld::new();
    world.define("menu", SceneSpec::default());
    world.define("loading", SceneSpec::default().with_presenter());
    world.define("level-1", SceneSpec::default());
    world.define("level-2", SceneSpec::default());
    world.define("main-menu", SceneSpec::default());
    world.preload("menu");
    world
}

/// Config with instant timings and the default loading screen
pub fn instant_config() -> SegueConfig {
    SegueConfig::new().with_timings(TransitionTimings::instant())
}

/// Orchestrator over `world` with an open gate, a moka cache and `config`
pub fn orchestrator_with(
    world: &Arc<SimulatedWorld>,
    cache: MokaContentCache,
    config: SegueConfig,
) -> SceneTransitionOrchestrator {
    SceneTransitionOrchestrator::builder(world.clone(), world.clone())
        .with_gate(Arc::new(SimulatedGate::open_after(std::time::Duration::ZERO)))
        .with_cache(Arc::new(cache))
        .with_config(config)
        .build()
}

/// Standard orchestrator over `world`
pub fn setup_orchestrator(world: &Arc<SimulatedWorld>) -> SceneTransitionOrchestrator {
    orchestrator_with(world, MokaContentCache::new(64), instant_config())
}

/// Assert that `statuses` is strictly ascending along the happy path, optionally
/// ending in `Failed`.
pub fn assert_status_order(statuses: &[TransitionStatus]) {
    let mut last: Option<usize> = None;
    for (i, status) in statuses.iter().enumerate() {
        if *status == TransitionStatus::Failed {
            assert_eq!(i + 1, statuses.len(), "Failed must be the last status: {statuses:?}");
            continue;
        }
        let position = HAPPY_PATH
            .iter()
            .position(|s| s == status)
            .unwrap_or_else(|| panic!("{status:?} is not on the happy path"));
        if let Some(previous) = last {
            assert!(position > previous, "status order violated at {status:?}: {statuses:?}");
        }
        last = Some(position);
    }
}
