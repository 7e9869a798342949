//! Recovery policy table
//!
//! The single authority consulted after a failed run: whether to try the fallback
//! destination, which message to show, and which recovery affordances to expose.

use crate::error::FailureCode;
use serde::Serialize;

/// Recovery decision for one failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryPolicy {
    /// Re-run the pipeline against the fallback destination
    pub do_fallback: bool,
    /// Localization key of the user-facing message
    pub ui_message_key: &'static str,
    /// Offer a retry action
    pub suggest_retry: bool,
    /// Offer a clear-cache action
    pub clear_cache_suggestion: bool,
}

impl RecoveryPolicy {
    const fn row(
        do_fallback: bool,
        ui_message_key: &'static str,
        suggest_retry: bool,
        clear_cache_suggestion: bool,
    ) -> Self {
        Self {
            do_fallback,
            ui_message_key,
            suggest_retry,
            clear_cache_suggestion,
        }
    }

    /// Default row for anything unrecognized
    pub const UNKNOWN: RecoveryPolicy = RecoveryPolicy::row(true, "transition.error.unknown", true, false);
}

/// Failure code → recovery policy lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct FailurePolicy;

impl FailurePolicy {
    /// Look up the policy for a code. Total.
    #[must_use]
    pub const fn get(code: FailureCode) -> RecoveryPolicy {
        match code {
            FailureCode::Canceled => RecoveryPolicy::row(false, "transition.error.canceled", false, false),
            FailureCode::ServerTimeout => {
                RecoveryPolicy::row(true, "transition.error.server_timeout", true, false)
            }
            FailureCode::ServerRejected => {
                RecoveryPolicy::row(true, "transition.error.server_rejected", false, false)
            }
            FailureCode::ContentNotFound => {
                RecoveryPolicy::row(true, "transition.error.content_not_found", false, true)
            }
            FailureCode::ContentDownloadFailed => {
                RecoveryPolicy::row(true, "transition.error.content_download_failed", true, true)
            }
            FailureCode::SceneLoadFailed => {
                RecoveryPolicy::row(true, "transition.error.scene_load_failed", true, true)
            }
            FailureCode::InitializationCrashed => {
                RecoveryPolicy::row(true, "transition.error.initialization_crashed", false, false)
            }
            FailureCode::Unknown => RecoveryPolicy::UNKNOWN,
        }
    }

    /// Look up the policy for a raw code (e.g. from a remote report)
    #[must_use]
    pub fn get_raw(raw: u8) -> RecoveryPolicy {
        Self::get(FailureCode::from(raw))
    }

    /// The whole table, one row per code
    #[must_use]
    pub fn table() -> Vec<(FailureCode, RecoveryPolicy)> {
        FailureCode::ALL.iter().map(|&code| (code, Self::get(code))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flags(code: FailureCode) -> (bool, bool, bool) {
        let p = FailurePolicy::get(code);
        (p.do_fallback, p.suggest_retry, p.clear_cache_suggestion)
    }

    #[test]
    fn table_rows() {
        assert_eq!(flags(FailureCode::Canceled), (false, false, false));
        assert_eq!(flags(FailureCode::ServerTimeout), (true, true, false));
        assert_eq!(flags(FailureCode::ServerRejected), (true, false, false));
        assert_eq!(flags(FailureCode::ContentNotFound), (true, false, true));
        assert_eq!(flags(FailureCode::ContentDownloadFailed), (true, true, true));
        assert_eq!(flags(FailureCode::SceneLoadFailed), (true, true, true));
        assert_eq!(flags(FailureCode::InitializationCrashed), (true, false, false));
        assert_eq!(flags(FailureCode::Unknown), (true, true, false));
    }

    #[test]
    fn cancellation_never_falls_back() {
        assert!(!FailurePolicy::get(FailureCode::Canceled).do_fallback);
    }

    #[test]
    fn table_covers_every_code() {
        let table = FailurePolicy::table();
        assert_eq!(table.len(), FailureCode::ALL.len());
        assert!(table.iter().all(|(_, p)| p.ui_message_key.starts_with("transition.error.")));
    }

    proptest! {
        #[test]
        fn prop_raw_lookup_is_total(raw in any::<u8>()) {
            let policy = FailurePolicy::get_raw(raw);
            prop_assert!(!policy.ui_message_key.is_empty());
            if raw > 7 {
                prop_assert_eq!(policy, RecoveryPolicy::UNKNOWN);
            }
        }
    }
}
