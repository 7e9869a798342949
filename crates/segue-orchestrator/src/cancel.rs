//! Cooperative cancellation helpers
//!
//! Every suspension point in a transition goes through [`cancellable`], so a canceled
//! token is observed within one await regardless of the phase.

use segue_core::TransitionError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fail with `Canceled` if the token already fired
#[inline]
pub fn ensure_active(cancel: &CancellationToken, what: impl Display) -> Result<(), TransitionError> {
    if cancel.is_cancelled() {
        Err(TransitionError::canceled(what))
    } else {
        Ok(())
    }
}

/// Race a future against the token. Cancellation wins ties.
pub async fn cancellable<F>(
    cancel: &CancellationToken,
    what: impl Display,
    future: F,
) -> Result<F::Output, TransitionError>
where
    F: Future,
{
    ensure_active(cancel, &what)?;
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransitionError::canceled(what)),
        output = future => Ok(output),
    }
}

/// Cancellable sleep; a zero duration only checks the token
pub async fn sleep(
    cancel: &CancellationToken,
    duration: Duration,
    what: impl Display,
) -> Result<(), TransitionError> {
    if duration.is_zero() {
        return ensure_active(cancel, what);
    }
    cancellable(cancel, what, tokio::time::sleep(duration)).await
}
