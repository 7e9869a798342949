//! Transition request
//!
//! Immutable input to one transition. Build it with the `with_*` methods, hand it to
//! the orchestrator, and never touch it again; a fallback attempt is a new request
//! derived with [`TransitionRequest::redirected_to_fallback`].

use crate::collaborators::{Fader, InputBlocker, TransitionEvents};
use crate::types::{
    CacheClearMode, GateId, LoadMode, SceneKey, TransitionArgs, TransitionTimings, UnloadPolicy,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Everything one transition needs to know
#[derive(Clone)]
pub struct TransitionRequest {
    /// Scene to end up in
    pub destination: SceneKey,
    /// Scene to try when the destination fails
    pub fallback_destination: Option<SceneKey>,
    /// Show the temporary loading screen while loading
    pub show_loading_screen: bool,
    /// Loading screen to use instead of the configured default
    pub loading_screen_override: Option<SceneKey>,
    /// Single or additive destination load
    pub load_mode: LoadMode,
    /// External gate to wait on before activation
    pub activation_gate: Option<GateId>,
    /// Upper bound on the gate wait
    pub activation_gate_timeout: Option<Duration>,
    /// Which origin scenes get unloaded
    pub unload_policy: UnloadPolicy,
    /// Scenes the unload step never touches
    pub keep_scene_names: Vec<SceneKey>,
    /// Fade overlay
    pub fader: Option<Arc<dyn Fader>>,
    /// Input gate
    pub input_blocker: Option<Arc<dyn InputBlocker>>,
    /// Extra observer for this run
    pub events: Option<Arc<dyn TransitionEvents>>,
    /// Phase delays and fade durations
    pub timings: TransitionTimings,
    /// Isolate objects spawned mid-load in a spill container
    pub anti_spill: bool,
    /// Spill container name (configured default when `None`)
    pub anti_spill_name: Option<String>,
    /// Allow re-running against `fallback_destination`
    pub enable_fallback: bool,
    /// Cache work during the `CleaningCache` phase
    pub cache_clear_mode: CacheClearMode,
    /// Cache label overriding the destination key
    pub cache_label: Option<String>,
    /// Arguments handed to the destination
    pub args: TransitionArgs,
}

impl TransitionRequest {
    /// Request with defaults: single load, loading screen on, unload active origin
    #[must_use]
    pub fn new(destination: impl Into<SceneKey>) -> Self {
        Self {
            destination: destination.into(),
            fallback_destination: None,
            show_loading_screen: true,
            loading_screen_override: None,
            load_mode: LoadMode::Single,
            activation_gate: None,
            activation_gate_timeout: None,
            unload_policy: UnloadPolicy::ActiveOnly,
            keep_scene_names: Vec::new(),
            fader: None,
            input_blocker: None,
            events: None,
            timings: TransitionTimings::default(),
            anti_spill: false,
            anti_spill_name: None,
            enable_fallback: false,
            cache_clear_mode: CacheClearMode::None,
            cache_label: None,
            args: TransitionArgs::new(),
        }
    }

    /// With a fallback destination (also enables fallback)
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<SceneKey>) -> Self {
        self.fallback_destination = Some(fallback.into());
        self.enable_fallback = true;
        self
    }

    /// Toggle fallback without changing the key
    #[inline]
    #[must_use]
    pub fn with_fallback_enabled(mut self, enabled: bool) -> Self {
        self.enable_fallback = enabled;
        self
    }

    /// Show or hide the loading screen
    #[inline]
    #[must_use]
    pub fn with_loading_screen(mut self, show: bool) -> Self {
        self.show_loading_screen = show;
        self
    }

    /// Use a specific loading screen
    #[inline]
    #[must_use]
    pub fn with_loading_screen_override(mut self, key: impl Into<SceneKey>) -> Self {
        self.loading_screen_override = Some(key.into());
        self.show_loading_screen = true;
        self
    }

    /// Load mode
    #[inline]
    #[must_use]
    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    /// Wait on a gate before activation
    #[inline]
    #[must_use]
    pub fn with_activation_gate(mut self, gate: GateId, timeout: Option<Duration>) -> Self {
        self.activation_gate = Some(gate);
        self.activation_gate_timeout = timeout;
        self
    }

    /// Bound the gate wait (default gate id when none is set)
    #[inline]
    #[must_use]
    pub fn with_activation_gate_timeout(mut self, timeout: Duration) -> Self {
        self.activation_gate_timeout = Some(timeout);
        self
    }

    /// Unload policy
    #[inline]
    #[must_use]
    pub fn with_unload_policy(mut self, policy: UnloadPolicy) -> Self {
        self.unload_policy = policy;
        self
    }

    /// Never unload this scene
    #[inline]
    #[must_use]
    pub fn keep_scene(mut self, key: impl Into<SceneKey>) -> Self {
        self.keep_scene_names.push(key.into());
        self
    }

    /// Fade overlay
    #[inline]
    #[must_use]
    pub fn with_fader(mut self, fader: Arc<dyn Fader>) -> Self {
        self.fader = Some(fader);
        self
    }

    /// Input gate
    #[inline]
    #[must_use]
    pub fn with_input_blocker(mut self, blocker: Arc<dyn InputBlocker>) -> Self {
        self.input_blocker = Some(blocker);
        self
    }

    /// Extra observer
    #[inline]
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn TransitionEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Timings
    #[inline]
    #[must_use]
    pub fn with_timings(mut self, timings: TransitionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Enable anti-spill, optionally naming the container
    #[inline]
    #[must_use]
    pub fn with_anti_spill(mut self, enabled: bool, name: Option<String>) -> Self {
        self.anti_spill = enabled;
        self.anti_spill_name = name;
        self
    }

    /// Cache work for the `CleaningCache` phase
    #[inline]
    #[must_use]
    pub fn with_cache_clear(mut self, mode: CacheClearMode, label: Option<String>) -> Self {
        self.cache_clear_mode = mode;
        self.cache_label = label;
        self
    }

    /// Add one destination argument
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Whether the gate step runs
    #[inline]
    #[must_use]
    pub fn waits_for_gate(&self) -> bool {
        self.activation_gate.is_some() || self.activation_gate_timeout.is_some()
    }

    /// Gate to wait on (default id when only a timeout is set)
    #[must_use]
    pub fn gate_id(&self) -> GateId {
        self.activation_gate.clone().unwrap_or_default()
    }

    /// Whether a fallback run is possible for this request
    #[must_use]
    pub fn can_fall_back(&self) -> bool {
        self.enable_fallback
            && self
                .fallback_destination
                .as_ref()
                .is_some_and(|fallback| *fallback != self.destination)
    }

    /// The request a fallback run uses: same settings, fallback as destination, no
    /// further fallback, no destination-specific cache label.
    #[must_use]
    pub fn redirected_to_fallback(&self) -> Option<Self> {
        if !self.can_fall_back() {
            return None;
        }
        let mut next = self.clone();
        next.destination = self.fallback_destination.clone()?;
        next.fallback_destination = None;
        next.enable_fallback = false;
        next.cache_label = None;
        Some(next)
    }
}

impl fmt::Debug for TransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRequest")
            .field("destination", &self.destination)
            .field("fallback_destination", &self.fallback_destination)
            .field("show_loading_screen", &self.show_loading_screen)
            .field("loading_screen_override", &self.loading_screen_override)
            .field("load_mode", &self.load_mode)
            .field("activation_gate", &self.activation_gate)
            .field("activation_gate_timeout", &self.activation_gate_timeout)
            .field("unload_policy", &self.unload_policy)
            .field("keep_scene_names", &self.keep_scene_names)
            .field("fader", &self.fader.is_some())
            .field("input_blocker", &self.input_blocker.is_some())
            .field("events", &self.events.is_some())
            .field("timings", &self.timings)
            .field("anti_spill", &self.anti_spill)
            .field("anti_spill_name", &self.anti_spill_name)
            .field("enable_fallback", &self.enable_fallback)
            .field("cache_clear_mode", &self.cache_clear_mode)
            .field("cache_label", &self.cache_label)
            .field("args", &self.args)
            .finish()
    }
}
