//! Error types for Segue
//!
//! Provides the closed failure taxonomy every transition step raises:
//! - [`FailureCode`]: the fixed set of failure classes
//! - [`TransitionError`]: a code plus message and optional cause
//! - [`StatusOrderError`]: out-of-order status emission
//! - [`ConfigError`]: configuration loading/validation failures

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

/// Boxed error returned by external collaborators.
///
/// A collaborator may box a [`TransitionError`] to report a typed failure; anything
/// else is classified by [`crate::classify::classify`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Closed failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// Caller or user canceled the transition
    Canceled,
    /// An external gate did not respond in time
    ServerTimeout,
    /// An external gate or service refused the transition
    ServerRejected,
    /// Requested content does not exist
    ContentNotFound,
    /// Content could not be downloaded or the cache misbehaved
    ContentDownloadFailed,
    /// The content unit failed to load
    SceneLoadFailed,
    /// Destination (or orchestrator wiring) failed during initialization
    InitializationCrashed,
    /// Anything without a known classification
    Unknown,
}

impl FailureCode {
    /// Every code, in declaration order
    pub const ALL: [FailureCode; 8] = [
        FailureCode::Canceled,
        FailureCode::ServerTimeout,
        FailureCode::ServerRejected,
        FailureCode::ContentNotFound,
        FailureCode::ContentDownloadFailed,
        FailureCode::SceneLoadFailed,
        FailureCode::InitializationCrashed,
        FailureCode::Unknown,
    ];

    /// Stable numeric value
    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            FailureCode::Canceled => 0,
            FailureCode::ServerTimeout => 1,
            FailureCode::ServerRejected => 2,
            FailureCode::ContentNotFound => 3,
            FailureCode::ContentDownloadFailed => 4,
            FailureCode::SceneLoadFailed => 5,
            FailureCode::InitializationCrashed => 6,
            FailureCode::Unknown => 7,
        }
    }

    /// Snake-case name, matching the serde representation
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FailureCode::Canceled => "canceled",
            FailureCode::ServerTimeout => "server_timeout",
            FailureCode::ServerRejected => "server_rejected",
            FailureCode::ContentNotFound => "content_not_found",
            FailureCode::ContentDownloadFailed => "content_download_failed",
            FailureCode::SceneLoadFailed => "scene_load_failed",
            FailureCode::InitializationCrashed => "initialization_crashed",
            FailureCode::Unknown => "unknown",
        }
    }
}

/// Raw codes outside the known range collapse to [`FailureCode::Unknown`].
impl From<u8> for FailureCode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => FailureCode::Canceled,
            1 => FailureCode::ServerTimeout,
            2 => FailureCode::ServerRejected,
            3 => FailureCode::ContentNotFound,
            4 => FailureCode::ContentDownloadFailed,
            5 => FailureCode::SceneLoadFailed,
            6 => FailureCode::InitializationCrashed,
            _ => FailureCode::Unknown,
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified transition failure
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TransitionError {
    code: FailureCode,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl TransitionError {
    /// Create a typed failure
    #[inline]
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Cancellation observed while doing `what`
    #[inline]
    pub fn canceled(what: impl fmt::Display) -> Self {
        Self::new(FailureCode::Canceled, format!("canceled during {what}"))
    }

    /// Attach the underlying cause
    #[inline]
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Convert a collaborator failure.
    ///
    /// Typed failures pass through unchanged. Untyped ones go through the classifier;
    /// when it cannot tell, `known_mode` (what the calling step knows went wrong) wins.
    pub fn from_collaborator(error: BoxError, known_mode: FailureCode) -> Self {
        match error.downcast::<TransitionError>() {
            Ok(typed) => *typed,
            Err(other) => {
                let code = match crate::classify::classify(other.as_ref()) {
                    FailureCode::Unknown => known_mode,
                    code => code,
                };
                Self::new(code, other.to_string()).with_cause(other)
            }
        }
    }

    /// Failure code
    #[inline]
    #[must_use]
    pub fn code(&self) -> FailureCode {
        self.code
    }

    /// Human-readable message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this failure is a cancellation
    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.code == FailureCode::Canceled
    }
}

/// Out-of-order status emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition: {from:?} -> {to:?}")]
pub struct StatusOrderError {
    /// Last emitted status
    pub from: crate::status::TransitionStatus,
    /// Rejected status
    pub to: crate::status::TransitionStatus,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
