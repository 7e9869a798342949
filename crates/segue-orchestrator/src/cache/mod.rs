//! Content cache operations
//!
//! Thin cancellable wrapper over a [`CacheEngine`]. Engine calls are awaited inline on
//! the orchestration task; any engine failure comes back as `ContentDownloadFailed`
//! carrying the engine's error as its cause.

mod memory;

pub use memory::{CachedBundle, MokaContentCache};

use crate::cancel::cancellable;
use segue_core::{BoxError, CacheClearMode, CacheEngine, FailureCode, TransitionError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cancellable, typed-failure cache facade
#[derive(Clone)]
pub struct ContentCache {
    engine: Arc<dyn CacheEngine>,
}

impl ContentCache {
    /// Wrap an engine
    #[inline]
    #[must_use]
    pub fn new(engine: Arc<dyn CacheEngine>) -> Self {
        Self { engine }
    }

    /// Drop every cached entry
    pub async fn clear_all(&self, cancel: &CancellationToken) -> Result<(), TransitionError> {
        self.run("clear all cached content", cancel, self.engine.clear_all()).await
    }

    /// Drop entries for one key or label
    pub async fn clear_label(&self, label: &str, cancel: &CancellationToken) -> Result<(), TransitionError> {
        self.run(
            format!("clear cached content for '{label}'"),
            cancel,
            self.engine.clear_label(label),
        )
        .await
    }

    /// Drop entries nothing uses
    pub async fn clean_unused(&self, cancel: &CancellationToken) -> Result<(), TransitionError> {
        self.run("clean unused cached content", cancel, self.engine.clean_unused()).await
    }

    /// Run the operation a request asked for. Returns whether any work was done.
    pub async fn apply(
        &self,
        mode: CacheClearMode,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, TransitionError> {
        match mode {
            CacheClearMode::None => return Ok(false),
            CacheClearMode::All => self.clear_all(cancel).await?,
            CacheClearMode::ByLabel => self.clear_label(label, cancel).await?,
            CacheClearMode::CleanUnused => self.clean_unused(cancel).await?,
        }
        Ok(true)
    }

    async fn run<F>(
        &self,
        what: impl fmt::Display,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<(), TransitionError>
    where
        F: Future<Output = Result<(), BoxError>>,
    {
        tracing::debug!("Cache: {}", what);
        cancellable(cancel, &what, operation).await?.map_err(|cause| {
            tracing::warn!("Cache operation failed ({}): {}", what, cause);
            TransitionError::new(FailureCode::ContentDownloadFailed, format!("failed to {what}"))
                .with_cause(cause)
        })
    }
}

impl fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::error::Error as _;

    #[derive(Default)]
    struct ScriptedEngine {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl CacheEngine for ScriptedEngine {
        async fn clear_all(&self) -> Result<(), BoxError> {
            self.record("all")
        }

        async fn clear_label(&self, label: &str) -> Result<(), BoxError> {
            self.record(&format!("label:{label}"))
        }

        async fn clean_unused(&self) -> Result<(), BoxError> {
            self.record("unused")
        }
    }

    impl ScriptedEngine {
        fn record(&self, call: &str) -> Result<(), BoxError> {
            self.calls.lock().push(call.to_string());
            if self.fail {
                Err("engine reported non-success".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn apply_dispatches_by_mode() {
        let engine = Arc::new(ScriptedEngine::default());
        let cache = ContentCache::new(engine.clone());
        let cancel = CancellationToken::new();

        assert!(!cache.apply(CacheClearMode::None, "x", &cancel).await.unwrap());
        assert!(cache.apply(CacheClearMode::All, "x", &cancel).await.unwrap());
        assert!(cache.apply(CacheClearMode::ByLabel, "level-2", &cancel).await.unwrap());
        assert!(cache.apply(CacheClearMode::CleanUnused, "x", &cancel).await.unwrap());

        assert_eq!(*engine.calls.lock(), vec!["all", "label:level-2", "unused"]);
    }

    #[tokio::test]
    async fn engine_failure_is_typed_with_cause() {
        let engine = Arc::new(ScriptedEngine {
            fail: true,
            ..ScriptedEngine::default()
        });
        let cache = ContentCache::new(engine);

        let err = cache.clear_all(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), FailureCode::ContentDownloadFailed);
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("engine reported non-success")
        );
    }

    #[tokio::test]
    async fn canceled_before_engine_call() {
        let engine = Arc::new(ScriptedEngine::default());
        let cache = ContentCache::new(engine.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cache.clean_unused(&cancel).await.unwrap_err();
        assert!(err.is_canceled());
        assert!(engine.calls.lock().is_empty());
    }
}
