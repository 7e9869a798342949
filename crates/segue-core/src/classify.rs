//! Failure classification
//!
//! Maps an arbitrary error to a [`FailureCode`]. Typed failures carry their own code;
//! the message sniffing below only exists for collaborators that still raise untyped
//! errors, and is brittle to message-text changes.

use crate::error::{FailureCode, TransitionError};
use std::error::Error as StdError;

/// Substrings (lowercase) that mark a gate or server timeout
pub const GATE_TIMEOUT_MARKERS: &[&str] = &["gate timeout", "timed out", "timeout", "deadline exceeded"];

/// Substrings (lowercase) that mark an authorization refusal
pub const AUTHORIZATION_MARKERS: &[&str] = &[
    "unauthorized",
    "unauthorised",
    "forbidden",
    "not authorized",
    "rejected",
    "denied",
    "401",
    "403",
];

/// Classify an error into the closed taxonomy.
///
/// Total: every input yields a code.
#[must_use]
pub fn classify(error: &(dyn StdError + 'static)) -> FailureCode {
    if let Some(typed) = error.downcast_ref::<TransitionError>() {
        return typed.code();
    }
    if error.is::<tokio::time::error::Elapsed>() {
        return FailureCode::ServerTimeout;
    }
    if let Some(join) = error.downcast_ref::<tokio::task::JoinError>() {
        if join.is_cancelled() {
            return FailureCode::Canceled;
        }
    }
    classify_message(&error.to_string())
}

/// Classify a bare message with the substring markers
#[must_use]
pub fn classify_message(message: &str) -> FailureCode {
    let lowered = message.to_lowercase();
    if GATE_TIMEOUT_MARKERS.iter().any(|m| lowered.contains(m)) {
        FailureCode::ServerTimeout
    } else if AUTHORIZATION_MARKERS.iter().any(|m| lowered.contains(m)) {
        FailureCode::ServerRejected
    } else {
        FailureCode::Unknown
    }
}
