//! Segue Orchestrator - staged scene transitions
//!
//! Runs a [`TransitionRequest`](segue_core::TransitionRequest) as an ordered pipeline of
//! steps (input block, entry fade, loading screen, origin unload, destination load,
//! gate, cache, activation, exit fade) with:
//! - Cooperative cancellation through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - A cleanup plan that always runs and restores the world on failure
//! - Anti-spill isolation of objects spawned while loading
//! - Policy-driven fallback, retry and clear-cache recovery
//! - An event bus and a presentation view-model
//!
//! # Example
//!
//! ```rust
//! use segue_orchestrator::prelude::*;
//! use segue_orchestrator::simulator::{SceneSpec, SimulatedWorld};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let world = SimulatedWorld::new();
//! for key in ["menu", "loading", "level-1"] {
//!     world.define(key, SceneSpec::default());
//! }
//! world.preload("menu");
//!
//! let orchestrator = SceneTransitionOrchestrator::builder(world.clone(), world.clone())
//!     .with_config(SegueConfig::new().with_timings(TransitionTimings::instant()))
//!     .build();
//!
//! let outcome = orchestrator
//!     .run(orchestrator.request("level-1"), &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.destination.as_str(), "level-1");
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod anti_spill;
pub mod cache;
pub mod cancel;
pub mod cleanup;
pub mod context;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod simulator;
pub mod steps;
pub mod view_model;

// Re-exports for convenience
pub use anti_spill::{AntiSpill, FlushReport};
pub use cache::{ContentCache, MokaContentCache};
pub use cleanup::{CleanupPlan, CleanupReport};
pub use context::{Collaborators, StatusEmitter, TransitionContext};
pub use events::{StatusWaiter, Subscription, TransitionEvent, TransitionEventBus};
pub use orchestrator::{
    FallbackOrigin, OrchestratorBuilder, OrchestratorError, SceneTransitionOrchestrator,
    TransitionFailure, TransitionOutcome,
};
pub use pipeline::{Pipeline, PipelineBuildError, PipelineBuilder, PipelineSummary, StepFailure};
pub use steps::TransitionStep;
pub use view_model::{RecoveryAction, TransitionViewModel, ViewState};

/// Everything needed to wire an orchestrator into an application
pub mod prelude {
    pub use crate::events::{TransitionEvent, TransitionEventBus};
    pub use crate::orchestrator::{OrchestratorError, SceneTransitionOrchestrator, TransitionOutcome};
    pub use crate::view_model::{RecoveryAction, TransitionViewModel};
    pub use segue_core::{
        CacheClearMode, FailureCode, FailurePolicy, GateId, LoadMode, SceneKey, SegueConfig,
        TransitionRequest, TransitionStatus, TransitionTimings, UnloadPolicy,
    };
    pub use tokio_util::sync::CancellationToken;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
