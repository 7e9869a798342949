//! Transition status state machine
//!
//! The happy path is strictly ordered and never branches. Steps emit these for
//! observers; nothing in the pipeline reads them back for control decisions.

use crate::error::StatusOrderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransitionStatus {
    /// Nothing has happened yet
    #[default]
    None,
    LoadStarted,
    InputBlocked,
    BeforeEntryFade,
    EntryFade,
    AfterEntryFade,
    UnloadOriginScene,
    LoadDestinationScene,
    LoadProgressComplete,
    /// Skipped unless an activation gate is configured
    WaitingForServer,
    /// Skipped unless a cache-clear mode is requested
    CleaningCache,
    BeforeSceneActivation,
    DestinationSceneActivation,
    AfterSceneActivation,
    ExitFade,
    InputUnblocked,
    UnloadLoadingScreen,
    Complete,
    /// Terminal; reachable from any non-terminal phase
    Failed,
}

/// The happy path, in order
pub const HAPPY_PATH: [TransitionStatus; 18] = [
    TransitionStatus::None,
    TransitionStatus::LoadStarted,
    TransitionStatus::InputBlocked,
    TransitionStatus::BeforeEntryFade,
    TransitionStatus::EntryFade,
    TransitionStatus::AfterEntryFade,
    TransitionStatus::UnloadOriginScene,
    TransitionStatus::LoadDestinationScene,
    TransitionStatus::LoadProgressComplete,
    TransitionStatus::WaitingForServer,
    TransitionStatus::CleaningCache,
    TransitionStatus::BeforeSceneActivation,
    TransitionStatus::DestinationSceneActivation,
    TransitionStatus::AfterSceneActivation,
    TransitionStatus::ExitFade,
    TransitionStatus::InputUnblocked,
    TransitionStatus::UnloadLoadingScreen,
    TransitionStatus::Complete,
];

impl TransitionStatus {
    /// Position on the happy path; `None` for [`TransitionStatus::Failed`]
    #[must_use]
    pub fn ordinal(self) -> Option<usize> {
        HAPPY_PATH.iter().position(|s| *s == self)
    }

    /// Whether no further status may follow
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TransitionStatus::Complete | TransitionStatus::Failed)
    }

    /// Default presentation text
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TransitionStatus::None => "",
            TransitionStatus::LoadStarted => "Starting",
            TransitionStatus::InputBlocked => "Preparing",
            TransitionStatus::BeforeEntryFade
            | TransitionStatus::EntryFade
            | TransitionStatus::AfterEntryFade => "Leaving",
            TransitionStatus::UnloadOriginScene => "Unloading",
            TransitionStatus::LoadDestinationScene => "Loading",
            TransitionStatus::LoadProgressComplete => "Loaded",
            TransitionStatus::WaitingForServer => "Waiting for server",
            TransitionStatus::CleaningCache => "Cleaning cache",
            TransitionStatus::BeforeSceneActivation
            | TransitionStatus::DestinationSceneActivation
            | TransitionStatus::AfterSceneActivation => "Entering",
            TransitionStatus::ExitFade | TransitionStatus::InputUnblocked => "Finishing",
            TransitionStatus::UnloadLoadingScreen => "Cleaning up",
            TransitionStatus::Complete => "Done",
            TransitionStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Validates a status transition.
///
/// Forward skips are allowed (conditional phases); repeats and backward moves are not.
pub fn validate_transition(
    from: TransitionStatus,
    to: TransitionStatus,
) -> Result<(), StatusOrderError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal status transition attempted: {:?} -> {:?}", from, to);

        #[cfg(not(feature = "strict-debug"))]
        Err(StatusOrderError { from, to })
    }
}

fn allowed(from: TransitionStatus, to: TransitionStatus) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to == TransitionStatus::Failed {
        return true;
    }
    match (from.ordinal(), to.ordinal()) {
        (Some(a), Some(b)) => b > a,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn happy_path_is_accepted_step_by_step() {
        for pair in HAPPY_PATH.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{:?}", pair);
        }
    }

    #[test]
    fn conditional_phases_may_be_skipped() {
        assert!(validate_transition(
            TransitionStatus::LoadProgressComplete,
            TransitionStatus::BeforeSceneActivation
        )
        .is_ok());
    }

    #[test]
    fn backwards_and_repeats_rejected() {
        assert!(validate_transition(TransitionStatus::ExitFade, TransitionStatus::EntryFade).is_err());
        assert!(validate_transition(TransitionStatus::EntryFade, TransitionStatus::EntryFade).is_err());
    }

    #[test]
    fn failed_is_terminal_and_reachable() {
        assert!(validate_transition(TransitionStatus::None, TransitionStatus::Failed).is_ok());
        assert!(validate_transition(TransitionStatus::ExitFade, TransitionStatus::Failed).is_ok());
        assert!(validate_transition(TransitionStatus::Failed, TransitionStatus::Complete).is_err());
        assert!(validate_transition(TransitionStatus::Complete, TransitionStatus::Failed).is_err());
    }

    fn any_status() -> impl Strategy<Value = TransitionStatus> {
        prop_oneof![
            (0..HAPPY_PATH.len()).prop_map(|i| HAPPY_PATH[i]),
            Just(TransitionStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_forward_only(from in any_status(), to in any_status()) {
            let ok = validate_transition(from, to).is_ok();
            let expected = !from.is_terminal()
                && (to == TransitionStatus::Failed
                    || matches!((from.ordinal(), to.ordinal()), (Some(a), Some(b)) if b > a));
            prop_assert_eq!(ok, expected);
        }
    }
}
