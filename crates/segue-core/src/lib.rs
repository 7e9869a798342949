//! Segue Core - request model and contracts for scene transitions
//!
//! Everything the orchestrator reasons about without doing any work itself:
//! - The immutable [`TransitionRequest`]
//! - The closed failure taxonomy and its classifier
//! - The recovery policy table
//! - The ordered status state machine
//! - Collaborator traits for loaders, gates, fades, input and presentation
//! - TOML configuration
//!
//! # Example
//!
//! ```rust
//! use segue_core::{FailureCode, FailurePolicy, SegueConfig};
//!
//! let config = SegueConfig::new().with_fallback_destination("main-menu");
//! let request = config.request("level-2");
//! assert!(request.can_fall_back());
//!
//! let policy = FailurePolicy::get(FailureCode::ContentDownloadFailed);
//! assert!(policy.do_fallback && policy.suggest_retry && policy.clear_cache_suggestion);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache_key;
pub mod classify;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod policy;
pub mod request;
pub mod status;
pub mod types;

// Re-exports for convenience
pub use cache_key::CacheKeyResolver;
pub use classify::classify;
pub use collaborators::{
    AsyncOperation, CacheEngine, Fader, FailureNotice, Gate, InputBlocker, LoadOptions,
    LoadingScreenPresenter, ProgressCallback, SceneGraph, SceneLoader, TransitionEvents,
    TransitionUi, UiCallback,
};
pub use config::{AntiSpillConfig, SegueConfig};
pub use error::{BoxError, ConfigError, FailureCode, StatusOrderError, TransitionError};
pub use policy::{FailurePolicy, RecoveryPolicy};
pub use request::TransitionRequest;
pub use status::{validate_transition, TransitionStatus, HAPPY_PATH};
pub use types::{
    CacheClearMode, GateId, LoadMode, ObjectId, SceneHandle, SceneKey, TransitionArgs,
    TransitionId, TransitionTimings, UnloadPolicy,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
