//! Scripted transition scenarios
//!
//! A scenario describes a simulated world, one request and optionally a gate and a
//! cancellation deadline. Running it drives a real orchestrator over the simulator
//! and reports what every observer saw.
//!
//! ```toml
//! initial = ["menu"]
//! cancel_after_ms = 250
//!
//! [scenes.loading]
//! presenter = true
//!
//! [scenes.level-1]
//! load_time_ms = 400
//! failure = { kind = "typed", code = "content_download_failed", message = "CDN 502" }
//!
//! [request]
//! destination = "level-1"
//! fallback = "menu"
//!
//! [gate]
//! kind = "open_after"
//! delay_ms = 100
//! ```

use super::collaborators::{FadeDirection, GateBehavior, RecordingFader, RecordingInputBlocker, SimulatedGate};
use super::world::{SceneSpec, SimulatedWorld, WorldEvent};
use crate::cache::MokaContentCache;
use crate::cleanup::CleanupReport;
use crate::events::TransitionEvent;
use crate::orchestrator::{OrchestratorError, SceneTransitionOrchestrator};
use parking_lot::Mutex;
use segue_core::{
    CacheClearMode, ConfigError, FailureCode, GateId, LoadMode, RecoveryPolicy, SceneKey, SegueConfig,
    TransitionArgs, TransitionRequest, TransitionStatus, TransitionTimings, UnloadPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SCENARIO_CACHE_CAPACITY: u64 = 256;

/// Request section of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub destination: String,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub enable_fallback: Option<bool>,
    #[serde(default)]
    pub show_loading_screen: Option<bool>,
    #[serde(default)]
    pub loading_screen: Option<String>,
    #[serde(default)]
    pub load_mode: LoadMode,
    #[serde(default)]
    pub unload_policy: Option<UnloadPolicy>,
    #[serde(default)]
    pub keep: Vec<String>,
    /// Gate id; the default gate is used when only a timeout is given
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub gate_timeout_ms: Option<u64>,
    #[serde(default)]
    pub cache_clear: CacheClearMode,
    #[serde(default)]
    pub cache_label: Option<String>,
    #[serde(default)]
    pub anti_spill: Option<bool>,
    #[serde(default)]
    pub timings: Option<TransitionTimings>,
    #[serde(default)]
    pub args: TransitionArgs,
}

impl ScenarioRequest {
    fn build(&self, config: &SegueConfig) -> TransitionRequest {
        let mut request = config.request(self.destination.as_str());
        if let Some(fallback) = &self.fallback {
            request = request.with_fallback(fallback.as_str());
        }
        if let Some(enabled) = self.enable_fallback {
            request = request.with_fallback_enabled(enabled);
        }
        if let Some(show) = self.show_loading_screen {
            request = request.with_loading_screen(show);
        }
        if let Some(key) = &self.loading_screen {
            request = request.with_loading_screen_override(key.as_str());
        }
        request = request.with_load_mode(self.load_mode);
        if let Some(policy) = self.unload_policy {
            request = request.with_unload_policy(policy);
        }
        for key in &self.keep {
            request = request.keep_scene(key.as_str());
        }
        let timeout = self.gate_timeout_ms.map(Duration::from_millis);
        match (&self.gate, timeout) {
            (Some(gate), timeout) => request = request.with_activation_gate(GateId::new(gate.clone()), timeout),
            (None, Some(timeout)) => request = request.with_activation_gate_timeout(timeout),
            (None, None) => {}
        }
        if self.cache_clear != CacheClearMode::None {
            request = request.with_cache_clear(self.cache_clear, self.cache_label.clone());
        }
        if let Some(enabled) = self.anti_spill {
            request = request.with_anti_spill(enabled, Some(config.anti_spill.name.clone()));
        }
        if let Some(timings) = self.timings {
            request = request.with_timings(timings);
        }
        for (key, value) in &self.args {
            request = request.with_arg(key.clone(), value.clone());
        }
        request
    }
}

/// A scripted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scene behaviors, by key
    #[serde(default)]
    pub scenes: BTreeMap<String, SceneSpec>,
    /// Scenes loaded before the run; the first one is active
    #[serde(default)]
    pub initial: Vec<String>,
    pub request: ScenarioRequest,
    /// Activation gate behavior; opens immediately when absent
    #[serde(default)]
    pub gate: Option<GateBehavior>,
    /// Cancel the run after this long
    #[serde(default)]
    pub cancel_after_ms: Option<u64>,
}

/// What a scenario run produced
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// `complete`, `failed` or `rejected`
    pub outcome: &'static str,
    pub statuses: Vec<TransitionStatus>,
    pub active_scene: Option<SceneKey>,
    pub loaded_scenes: Vec<SceneKey>,
    pub failed_step: Option<&'static str>,
    pub code: Option<FailureCode>,
    pub policy: Option<RecoveryPolicy>,
    pub fell_back_from: Option<SceneKey>,
    pub error: Option<String>,
    pub fades: Vec<(FadeDirection, u64)>,
    pub input_blocked: bool,
    pub elapsed_ms: u64,
    pub cleanup: Option<CleanupReport>,
    pub world: Vec<WorldEvent>,
}

impl Scenario {
    /// Parse and validate TOML
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let scenario: Self = toml::from_str(source)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check that every referenced scene is declared
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request.destination.is_empty() {
            return Err(ConfigError::Invalid {
                field: "request.destination",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(missing) = self.initial.iter().find(|key| !self.scenes.contains_key(*key)) {
            return Err(ConfigError::Invalid {
                field: "initial",
                reason: format!("scene '{missing}' is not declared under [scenes]"),
            });
        }
        Ok(())
    }

    /// Build a world populated from this scenario
    #[must_use]
    pub fn world(&self) -> Arc<SimulatedWorld> {
        let world = SimulatedWorld::new();
        for (key, spec) in &self.scenes {
            world.define(key.as_str(), spec.clone());
        }
        for key in &self.initial {
            world.preload(key.as_str());
        }
        world
    }

    /// Drive an orchestrator through the scenario
    pub async fn run(&self, config: SegueConfig) -> ScenarioReport {
        let world = self.world();
        let gate = SimulatedGate::new(self.gate.clone().unwrap_or(GateBehavior::OpenAfter {
            delay: Duration::ZERO,
        }));
        let orchestrator = SceneTransitionOrchestrator::builder(world.clone(), world.clone())
            .with_gate(Arc::new(gate))
            .with_cache(Arc::new(MokaContentCache::new(SCENARIO_CACHE_CAPACITY)))
            .with_config(config.clone())
            .build();

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let recorder = statuses.clone();
        let _subscription = orchestrator.bus().subscribe(move |event| {
            if let TransitionEvent::Status(status) = event {
                recorder.lock().push(*status);
            }
        });

        let fader = Arc::new(RecordingFader::default());
        let blocker = Arc::new(RecordingInputBlocker::default());
        let request = self
            .request
            .build(&config)
            .with_fader(fader.clone())
            .with_input_blocker(blocker.clone());

        let cancel = CancellationToken::new();
        let deadline = self.cancel_after_ms.map(|ms| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                tracing::info!("Scenario deadline reached, canceling");
                cancel.cancel();
            })
        });

        let started = tokio::time::Instant::now();
        let result = orchestrator.run(request, &cancel).await;
        let elapsed = started.elapsed();
        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let mut report = ScenarioReport {
            outcome: "complete",
            statuses: statuses.lock().clone(),
            active_scene: world.active_key(),
            loaded_scenes: world.loaded_keys(),
            failed_step: None,
            code: None,
            policy: None,
            fell_back_from: None,
            error: None,
            fades: fader
                .calls()
                .into_iter()
                .map(|(direction, duration)| (direction, u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)))
                .collect(),
            input_blocked: blocker.is_blocked(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            cleanup: None,
            world: world.log(),
        };
        match result {
            Ok(outcome) => {
                report.fell_back_from = outcome.fell_back_from.map(|origin| origin.destination);
                report.cleanup = Some(outcome.cleanup);
            }
            Err(OrchestratorError::Failed(failure)) => {
                let code = failure.surfaced_code();
                report.outcome = "failed";
                report.failed_step = Some(failure.step);
                report.code = Some(code);
                report.policy = Some(failure.policy);
                report.error = Some(failure.error.to_string());
                report.cleanup = Some(failure.cleanup);
            }
            Err(other) => {
                report.outcome = "rejected";
                report.code = other.code();
                report.error = Some(other.to_string());
            }
        }
        report
    }
}
