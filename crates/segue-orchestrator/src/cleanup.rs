//! Cleanup plan
//!
//! Steps record the temporary resources they acquire; the orchestrator executes the
//! plan exactly once when the run ends, however it ends. Only entries whose flag is
//! set are acted upon, so on a successful run the plan is normally empty by the time
//! it executes.

use crate::context::TransitionContext;
use segue_core::SceneHandle;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Temporary resources held by a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    loading_screen: Option<SceneHandle>,
    loading_screen_loaded: bool,
    destination: Option<SceneHandle>,
    destination_loaded: bool,
    destination_activated: bool,
    anti_spill_prepared: bool,
    previous_active: Option<SceneHandle>,
    input_blocked: bool,
}

impl CleanupPlan {
    pub fn record_loading_screen(&mut self, handle: SceneHandle) {
        self.loading_screen = Some(handle);
        self.loading_screen_loaded = true;
    }

    /// The loading screen was unloaded by its step
    pub fn clear_loading_screen(&mut self) {
        self.loading_screen_loaded = false;
    }

    pub fn record_destination(&mut self, handle: SceneHandle) {
        self.destination = Some(handle);
        self.destination_loaded = true;
    }

    pub fn mark_destination_activated(&mut self) {
        self.destination_activated = true;
    }

    pub fn record_anti_spill_prepared(&mut self, prepared: bool) {
        self.anti_spill_prepared = prepared;
    }

    pub fn record_previous_active(&mut self, scene: Option<SceneHandle>) {
        self.previous_active = scene;
    }

    pub fn record_input_blocked(&mut self, blocked: bool) {
        self.input_blocked = blocked;
    }

    #[inline]
    #[must_use]
    pub fn loading_screen(&self) -> Option<&SceneHandle> {
        self.loading_screen.as_ref().filter(|_| self.loading_screen_loaded)
    }

    #[inline]
    #[must_use]
    pub fn destination_loaded(&self) -> bool {
        self.destination_loaded
    }

    #[inline]
    #[must_use]
    pub fn destination_activated(&self) -> bool {
        self.destination_activated
    }

    #[inline]
    #[must_use]
    pub fn anti_spill_prepared(&self) -> bool {
        self.anti_spill_prepared
    }

    #[inline]
    #[must_use]
    pub fn previous_active(&self) -> Option<&SceneHandle> {
        self.previous_active.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn input_blocked(&self) -> bool {
        self.input_blocked
    }

    /// Release everything still held.
    ///
    /// Order: restore the previously active scene (unless the destination took over),
    /// drop the spill container, unload an unactivated destination, unload the loading
    /// screen, re-enable input. Individual failures are collected, never propagated.
    pub async fn execute(self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> CleanupReport {
        let mut report = CleanupReport::default();
        let scenes = ctx.scenes().clone();
        let loader = ctx.loader().clone();

        if !self.destination_activated {
            if let Some(previous) = &self.previous_active {
                if scenes.is_valid(previous) && scenes.is_loaded(previous) {
                    match scenes.set_active_scene(previous) {
                        Ok(()) => report.restored_active = true,
                        Err(e) => report.errors.push(format!("restore active scene {previous}: {e}")),
                    }
                }
            }
        }

        if self.anti_spill_prepared {
            if let Some(spill) = ctx.anti_spill_mut() {
                match spill.discard(cancel).await {
                    Ok(discarded) => report.discarded_anti_spill = discarded,
                    Err(e) => report.errors.push(format!("discard spill container: {e}")),
                }
            }
        }

        if self.destination_loaded && !self.destination_activated {
            if let Some(destination) = &self.destination {
                if scenes.is_valid(destination) {
                    match loader.unload(destination, cancel).await {
                        Ok(()) => report.unloaded_destination = true,
                        Err(e) => report.errors.push(format!("unload destination {destination}: {e}")),
                    }
                }
            }
        }

        if self.loading_screen_loaded {
            if let Some(loading_screen) = &self.loading_screen {
                if scenes.is_valid(loading_screen) {
                    match loader.unload(loading_screen, cancel).await {
                        Ok(()) => report.unloaded_loading_screen = true,
                        Err(e) => report.errors.push(format!("unload loading screen {loading_screen}: {e}")),
                    }
                }
            }
        }

        if self.input_blocked {
            if let Some(blocker) = &ctx.request().input_blocker {
                blocker.unblock();
                report.unblocked_input = true;
            }
        }

        for error in &report.errors {
            tracing::warn!("Cleanup: {}", error);
        }
        report
    }
}

/// What a cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub restored_active: bool,
    pub discarded_anti_spill: bool,
    pub unloaded_destination: bool,
    pub unloaded_loading_screen: bool,
    pub unblocked_input: bool,
    /// Cleanup ran out of time before finishing
    pub timed_out: bool,
    pub errors: Vec<String>,
}

impl CleanupReport {
    /// Report for a pass cut short by the cleanup timeout
    #[must_use]
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    /// Nothing went wrong
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.timed_out && self.errors.is_empty()
    }
}
