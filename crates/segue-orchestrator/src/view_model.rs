//! Transition view-model
//!
//! Presentation state derived from bus events: status text, realtime and smoothed
//! progress, and recovery affordances. User recovery requests leave through a
//! broadcast channel; the orchestrator (or the application) decides what to do with
//! them.

use crate::events::{Subscription, TransitionEvent, TransitionEventBus};
use parking_lot::Mutex;
use segue_core::{FailureCode, FailureNotice, TransitionStatus, TransitionUi};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

const ACTION_CHANNEL_CAPACITY: usize = 16;

/// Recovery request raised from the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Run the same request again
    Retry,
    /// Clear cached content for the destination, then retry
    ClearCache,
}

/// Snapshot of everything the presentation shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub status: TransitionStatus,
    pub status_text: String,
    pub realtime_progress: f32,
    pub smoothed_progress: f32,
    pub retry_visible: bool,
    pub clear_cache_visible: bool,
    pub failure_code: Option<FailureCode>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            status: TransitionStatus::None,
            status_text: String::new(),
            realtime_progress: 0.0,
            smoothed_progress: 0.0,
            retry_visible: false,
            clear_cache_visible: false,
            failure_code: None,
        }
    }
}

/// Observable transition presentation state
pub struct TransitionViewModel {
    state: Mutex<ViewState>,
    smoothing: f32,
    actions: broadcast::Sender<RecoveryAction>,
    ui: Mutex<Option<Arc<dyn TransitionUi>>>,
}

impl TransitionViewModel {
    /// Create a view-model; `smoothing` is the smoothed progress speed in units per second
    #[must_use]
    pub fn new(smoothing: f32) -> Arc<Self> {
        let (actions, _) = broadcast::channel(ACTION_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: Mutex::new(ViewState::default()),
            smoothing: smoothing.max(f32::EPSILON),
            actions,
            ui: Mutex::new(None),
        })
    }

    /// Follow a bus until the returned subscription is dropped
    #[must_use = "dropping the subscription detaches the view-model"]
    pub fn bind(self: &Arc<Self>, bus: &TransitionEventBus) -> Subscription {
        let weak: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(move |event| {
            if let Some(view_model) = weak.upgrade() {
                view_model.apply(event);
            }
        })
    }

    /// Apply one bus event
    pub fn apply(&self, event: &TransitionEvent) {
        match event {
            TransitionEvent::Status(status) => self.set_status(*status),
            TransitionEvent::Progress(value) => self.set_realtime_progress(*value),
            TransitionEvent::Failed(notice) => self.show_failure(notice),
        }
    }

    /// Enter a phase. `LoadStarted` resets progress and hides recovery affordances.
    pub fn set_status(&self, status: TransitionStatus) {
        {
            let mut state = self.state.lock();
            if status == TransitionStatus::LoadStarted {
                *state = ViewState::default();
            }
            if status == TransitionStatus::Complete {
                state.realtime_progress = 1.0;
            }
            state.status = status;
            state.status_text = status.label().to_string();
        }
        self.sync_ui();
    }

    /// Set realtime progress, clamped to `0..=1`
    pub fn set_realtime_progress(&self, value: f32) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.state.lock().realtime_progress = value;
    }

    /// Advance the smoothed progress toward realtime by `dt`; returns the new value
    pub fn tick(&self, dt: Duration) -> f32 {
        let mut state = self.state.lock();
        let step = self.smoothing * dt.as_secs_f32();
        let target = state.realtime_progress;
        let current = state.smoothed_progress;
        state.smoothed_progress = if current < target {
            (current + step).min(target)
        } else {
            (current - step).max(target)
        };
        state.smoothed_progress
    }

    /// Show failure text and the affordances its policy allows
    pub fn show_failure(&self, notice: &FailureNotice) {
        {
            let mut state = self.state.lock();
            state.status = TransitionStatus::Failed;
            state.status_text = notice.policy.ui_message_key.to_string();
            state.failure_code = Some(notice.code);
            state.retry_visible = notice.policy.suggest_retry;
            state.clear_cache_visible = notice.policy.clear_cache_suggestion;
        }
        self.sync_ui();
    }

    /// Hide retry and clear-cache
    pub fn hide_recovery(&self) {
        {
            let mut state = self.state.lock();
            state.retry_visible = false;
            state.clear_cache_visible = false;
        }
        self.sync_ui();
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> ViewState {
        self.state.lock().clone()
    }

    /// Receive recovery requests
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<RecoveryAction> {
        self.actions.subscribe()
    }

    /// Ask for a retry; ignored unless retry is offered
    pub fn request_retry(&self) -> bool {
        let visible = self.state.lock().retry_visible;
        visible && self.send(RecoveryAction::Retry)
    }

    /// Ask for clear-cache-and-retry; ignored unless offered
    pub fn request_clear_cache(&self) -> bool {
        let visible = self.state.lock().clear_cache_visible;
        visible && self.send(RecoveryAction::ClearCache)
    }

    fn send(&self, action: RecoveryAction) -> bool {
        tracing::debug!("Recovery requested: {:?}", action);
        self.actions.send(action).is_ok()
    }

    /// Drive a presentation surface and wire its buttons
    pub fn attach_ui(self: &Arc<Self>, ui: Arc<dyn TransitionUi>) {
        let weak = Arc::downgrade(self);
        ui.bind_retry(Arc::new(move || {
            if let Some(view_model) = weak.upgrade() {
                view_model.request_retry();
            }
        }));
        let weak = Arc::downgrade(self);
        ui.bind_clear_cache(Arc::new(move || {
            if let Some(view_model) = weak.upgrade() {
                view_model.request_clear_cache();
            }
        }));
        *self.ui.lock() = Some(ui);
        self.sync_ui();
    }

    fn sync_ui(&self) {
        let Some(ui) = self.ui.lock().clone() else {
            return;
        };
        let state = self.snapshot();
        ui.set_status(&state.status_text);
        ui.set_retry_visible(state.retry_visible);
        ui.set_clear_cache_visible(state.clear_cache_visible);
    }
}

impl fmt::Debug for TransitionViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionViewModel")
            .field("state", &*self.state.lock())
            .field("smoothing", &self.smoothing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_core::{FailurePolicy, TransitionEvents, UiCallback};

    fn notice(code: FailureCode) -> FailureNotice {
        FailureNotice {
            code,
            message: "boom".to_string(),
            policy: FailurePolicy::get(code),
        }
    }

    #[derive(Default)]
    struct FakeUi {
        texts: Mutex<Vec<String>>,
        retry: Mutex<Option<UiCallback>>,
        retry_visible: Mutex<bool>,
    }

    impl TransitionUi for FakeUi {
        fn set_status(&self, text: &str) {
            self.texts.lock().push(text.to_string());
        }
        fn set_retry_visible(&self, visible: bool) {
            *self.retry_visible.lock() = visible;
        }
        fn set_clear_cache_visible(&self, _visible: bool) {}
        fn bind_retry(&self, on_click: UiCallback) {
            *self.retry.lock() = Some(on_click);
        }
        fn bind_clear_cache(&self, _on_click: UiCallback) {}
    }

    #[test]
    fn progress_is_clamped() {
        let vm = TransitionViewModel::new(1.0);
        vm.set_realtime_progress(3.5);
        assert_eq!(vm.snapshot().realtime_progress, 1.0);
        vm.set_realtime_progress(-1.0);
        assert_eq!(vm.snapshot().realtime_progress, 0.0);
        vm.set_realtime_progress(f32::NAN);
        assert_eq!(vm.snapshot().realtime_progress, 0.0);
    }

    #[test]
    fn smoothing_never_overshoots() {
        let vm = TransitionViewModel::new(2.0);
        vm.set_realtime_progress(0.5);

        let first = vm.tick(Duration::from_millis(100));
        assert!((first - 0.2).abs() < 1e-6);
        let second = vm.tick(Duration::from_secs(10));
        assert_eq!(second, 0.5);
    }

    #[test]
    fn bus_events_drive_state() {
        let bus = TransitionEventBus::new();
        let vm = TransitionViewModel::new(1.0);
        let _subscription = vm.bind(&bus);

        bus.emit(TransitionStatus::LoadDestinationScene);
        bus.progress(0.4);
        let state = vm.snapshot();
        assert_eq!(state.status, TransitionStatus::LoadDestinationScene);
        assert_eq!(state.status_text, "Loading");
        assert!((state.realtime_progress - 0.4).abs() < 1e-6);
    }

    #[test]
    fn failure_exposes_policy_affordances() {
        let vm = TransitionViewModel::new(1.0);
        vm.show_failure(&notice(FailureCode::ContentDownloadFailed));

        let state = vm.snapshot();
        assert!(state.retry_visible);
        assert!(state.clear_cache_visible);
        assert_eq!(state.status_text, "transition.error.content_download_failed");

        vm.set_status(TransitionStatus::LoadStarted);
        let state = vm.snapshot();
        assert!(!state.retry_visible && !state.clear_cache_visible);
        assert_eq!(state.failure_code, None);
    }

    #[test]
    fn hidden_affordances_ignore_requests() {
        let vm = TransitionViewModel::new(1.0);
        let mut actions = vm.subscribe_actions();

        assert!(!vm.request_retry());
        vm.show_failure(&notice(FailureCode::ServerTimeout));
        assert!(vm.request_retry());
        assert!(!vm.request_clear_cache());

        assert_eq!(actions.try_recv().unwrap(), RecoveryAction::Retry);
        assert!(actions.try_recv().is_err());
    }

    #[test]
    fn attached_ui_is_synced_and_bound() {
        let vm = TransitionViewModel::new(1.0);
        let ui = Arc::new(FakeUi::default());
        vm.attach_ui(ui.clone());
        let mut actions = vm.subscribe_actions();

        vm.show_failure(&notice(FailureCode::SceneLoadFailed));
        assert!(*ui.retry_visible.lock());
        assert_eq!(
            ui.texts.lock().last().map(String::as_str),
            Some("transition.error.scene_load_failed")
        );

        let click = ui.retry.lock().clone().unwrap();
        click();
        assert_eq!(actions.try_recv().unwrap(), RecoveryAction::Retry);
    }
}
