//! Deterministic in-memory engine
//!
//! Implements every collaborator contract over shared in-memory state so that the
//! orchestrator can be driven end to end without an engine: scripted load times,
//! injected failures, mid-load spawns, hanging loads and scripted gates. Used by the
//! test suites and by the `segue run` subcommand.

mod collaborators;
mod scenario;
mod world;

pub use collaborators::{
    FadeDirection, GateBehavior, RecordingFader, RecordingInputBlocker, SimulatedGate,
    SimulatedPresenter,
};
pub use scenario::{Scenario, ScenarioReport, ScenarioRequest};
pub use world::{InjectedFailure, SceneSpec, SimulatedWorld, WorldEvent};
