//! External collaborator contracts
//!
//! The orchestrator only calls through these traits. Engines, networking, fades and
//! presentation live behind them.
//!
//! Fallible collaborator calls return [`BoxError`]. A collaborator that knows what went
//! wrong should box a [`crate::TransitionError`]; anything else is classified.

use crate::error::{BoxError, FailureCode};
use crate::policy::RecoveryPolicy;
use crate::status::TransitionStatus;
use crate::types::{GateId, LoadMode, ObjectId, SceneHandle, SceneKey, TransitionArgs};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Load progress callback, called with values in `0.0..=1.0`
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Presentation button callback
pub type UiCallback = Arc<dyn Fn() + Send + Sync>;

/// Options for one scene load
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Single or additive
    pub mode: LoadMode,
    /// Optional progress sink
    pub progress: Option<ProgressCallback>,
}

impl LoadOptions {
    /// Options for a given mode, no progress reporting
    #[inline]
    #[must_use]
    pub fn new(mode: LoadMode) -> Self {
        Self {
            mode,
            progress: None,
        }
    }

    /// With a progress callback
    #[inline]
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Report progress if a sink is attached
    #[inline]
    pub fn report(&self, value: f32) {
        if let Some(progress) = &self.progress {
            progress(value.clamp(0.0, 1.0));
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("mode", &self.mode)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Loads and unloads named content units
#[async_trait]
pub trait SceneLoader: Send + Sync {
    /// Load a content unit. Must observe `cancel`.
    async fn load(
        &self,
        scene: &SceneKey,
        options: LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<SceneHandle, BoxError>;

    /// Unload a previously loaded unit. Must observe `cancel`.
    async fn unload(&self, scene: &SceneHandle, cancel: &CancellationToken) -> Result<(), BoxError>;

    /// Hand the caller's arguments to a freshly activated destination
    async fn activate(&self, scene: &SceneHandle, args: &TransitionArgs) -> Result<(), BoxError>;

    /// Presenter living inside a loaded loading-screen unit, if any
    fn loading_screen_presenter(&self, _scene: &SceneHandle) -> Option<Arc<dyn LoadingScreenPresenter>> {
        None
    }
}

/// Progress of an asynchronous engine operation
pub trait AsyncOperation: Send + Sync {
    /// Whether the operation finished
    fn is_done(&self) -> bool;

    /// Completion fraction
    fn progress(&self) -> f32 {
        if self.is_done() {
            1.0
        } else {
            0.0
        }
    }
}

/// Engine-side scene bookkeeping
pub trait SceneGraph: Send + Sync {
    /// Currently active scene
    fn active_scene(&self) -> Option<SceneHandle>;

    /// Make a scene the active one (new objects are parented under it)
    fn set_active_scene(&self, scene: &SceneHandle) -> Result<(), BoxError>;

    /// Every scene currently loaded, in load order
    fn loaded_scenes(&self) -> Vec<SceneHandle>;

    /// Handle still refers to an existing scene
    fn is_valid(&self, scene: &SceneHandle) -> bool;

    /// Scene exists and finished loading
    fn is_loaded(&self, scene: &SceneHandle) -> bool;

    /// Create an empty, loaded scene
    fn create_scene(&self, name: &str) -> Result<SceneHandle, BoxError>;

    /// Top-level objects parented under a scene, in enumeration order
    fn root_objects(&self, scene: &SceneHandle) -> Vec<ObjectId>;

    /// Reparent a top-level object into another scene
    fn move_to_scene(&self, object: ObjectId, scene: &SceneHandle) -> Result<(), BoxError>;

    /// Start unloading a scene; poll the returned operation until done
    fn begin_unload(&self, scene: &SceneHandle) -> Result<Box<dyn AsyncOperation>, BoxError>;
}

/// External synchronization barrier
#[async_trait]
pub trait Gate: Send + Sync {
    /// Resolve once the gate opens; fail if it refuses.
    ///
    /// `timeout` is informational; the caller enforces it.
    async fn wait(
        &self,
        gate: &GateId,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError>;
}

/// Full-screen fade overlay
#[async_trait]
pub trait Fader: Send + Sync {
    /// Bring the overlay in (screen covered)
    async fn fade_in(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), BoxError>;

    /// Take the overlay away (screen revealed)
    async fn fade_out(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), BoxError>;
}

/// UI input gate
pub trait InputBlocker: Send + Sync {
    /// Stop accepting input
    fn block(&self);

    /// Accept input again
    fn unblock(&self);
}

/// Failure details published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// Classified code
    pub code: FailureCode,
    /// Failure message
    pub message: String,
    /// Policy resolved for the code
    pub policy: RecoveryPolicy,
}

/// Observer of transition progress
pub trait TransitionEvents: Send + Sync {
    /// A phase was entered
    fn emit(&self, status: TransitionStatus);

    /// Realtime load progress
    fn progress(&self, _value: f32) {}

    /// The run failed
    fn failed(&self, _notice: &FailureNotice) {}
}

/// Thin presentation contract driven by the view-model
pub trait TransitionUi: Send + Sync {
    /// Show a status text
    fn set_status(&self, text: &str);

    /// Toggle the retry button
    fn set_retry_visible(&self, visible: bool);

    /// Toggle the clear-cache button
    fn set_clear_cache_visible(&self, visible: bool);

    /// Wire the retry button
    fn bind_retry(&self, on_click: UiCallback);

    /// Wire the clear-cache button
    fn bind_clear_cache(&self, on_click: UiCallback);
}

/// Presenter hosted by a loading-screen content unit
pub trait LoadingScreenPresenter: Send + Sync {
    /// Update the progress bar
    fn set_progress(&self, value: f32);

    /// Update the caption
    fn set_message(&self, _text: &str) {}
}

/// Engine-level downloaded-content cache
#[async_trait]
pub trait CacheEngine: Send + Sync {
    /// Drop every cached entry
    async fn clear_all(&self) -> Result<(), BoxError>;

    /// Drop entries associated with `label`
    async fn clear_label(&self, label: &str) -> Result<(), BoxError>;

    /// Drop entries nothing currently uses
    async fn clean_unused(&self) -> Result<(), BoxError>;
}
