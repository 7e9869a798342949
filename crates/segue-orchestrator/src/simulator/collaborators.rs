//! Simulated gate, fader, input blocker and loading-screen presenter

use crate::cancel::sleep;
use async_trait::async_trait;
use parking_lot::Mutex;
use segue_core::types::duration_ms;
use segue_core::{BoxError, Fader, Gate, GateId, InputBlocker, LoadingScreenPresenter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a [`SimulatedGate`] answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateBehavior {
    /// Opens after a delay
    OpenAfter {
        #[serde(with = "duration_ms", rename = "delay_ms")]
        delay: Duration,
    },
    /// Never answers
    Never,
    /// Refuses with a message
    Reject { message: String },
}

/// Scripted external gate
#[derive(Debug)]
pub struct SimulatedGate {
    behavior: GateBehavior,
    waits: Mutex<Vec<GateId>>,
}

impl SimulatedGate {
    #[must_use]
    pub fn new(behavior: GateBehavior) -> Self {
        Self {
            behavior,
            waits: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn open_after(delay: Duration) -> Self {
        Self::new(GateBehavior::OpenAfter { delay })
    }

    #[must_use]
    pub fn never() -> Self {
        Self::new(GateBehavior::Never)
    }

    #[must_use]
    pub fn reject(message: impl Into<String>) -> Self {
        Self::new(GateBehavior::Reject {
            message: message.into(),
        })
    }

    /// Gate ids waited on so far
    #[must_use]
    pub fn waits(&self) -> Vec<GateId> {
        self.waits.lock().clone()
    }
}

#[async_trait]
impl Gate for SimulatedGate {
    async fn wait(
        &self,
        gate: &GateId,
        _timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        self.waits.lock().push(gate.clone());
        match &self.behavior {
            GateBehavior::OpenAfter { delay } => {
                sleep(cancel, *delay, format!("gate {gate}")).await?;
                Ok(())
            }
            GateBehavior::Never => {
                cancel.cancelled().await;
                Err(Box::new(segue_core::TransitionError::canceled(format!("gate {gate}"))))
            }
            GateBehavior::Reject { message } => Err(message.clone().into()),
        }
    }
}

/// Fade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeDirection {
    In,
    Out,
}

/// Fader that sleeps for the fade duration and records each call
#[derive(Debug, Default)]
pub struct RecordingFader {
    calls: Mutex<Vec<(FadeDirection, Duration)>>,
}

impl RecordingFader {
    /// Fades performed so far
    #[must_use]
    pub fn calls(&self) -> Vec<(FadeDirection, Duration)> {
        self.calls.lock().clone()
    }

    async fn fade(
        &self,
        direction: FadeDirection,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        self.calls.lock().push((direction, duration));
        sleep(cancel, duration, format!("fade {direction:?}")).await?;
        Ok(())
    }
}

#[async_trait]
impl Fader for RecordingFader {
    async fn fade_in(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), BoxError> {
        self.fade(FadeDirection::In, duration, cancel).await
    }

    async fn fade_out(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), BoxError> {
        self.fade(FadeDirection::Out, duration, cancel).await
    }
}

/// Input blocker that remembers its state
#[derive(Debug, Default)]
pub struct RecordingInputBlocker {
    blocked: AtomicBool,
    history: Mutex<Vec<bool>>,
}

impl RecordingInputBlocker {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Every block (`true`) and unblock (`false`) call, in order
    #[must_use]
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().clone()
    }
}

impl InputBlocker for RecordingInputBlocker {
    fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
        self.history.lock().push(true);
    }

    fn unblock(&self) {
        self.blocked.store(false, Ordering::SeqCst);
        self.history.lock().push(false);
    }
}

/// Progress bar living in a simulated loading screen
#[derive(Debug, Default)]
pub struct SimulatedPresenter {
    progress: Mutex<Vec<f32>>,
    messages: Mutex<Vec<String>>,
}

impl SimulatedPresenter {
    #[must_use]
    pub fn progress(&self) -> Vec<f32> {
        self.progress.lock().clone()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl LoadingScreenPresenter for SimulatedPresenter {
    fn set_progress(&self, value: f32) {
        self.progress.lock().push(value);
    }

    fn set_message(&self, text: &str) {
        self.messages.lock().push(text.to_string());
    }
}
