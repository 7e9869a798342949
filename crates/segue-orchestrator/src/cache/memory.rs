//! In-process downloaded-content cache using moka

use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::Mutex;
use segue_core::{BoxError, CacheEngine};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// One downloaded content bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBundle {
    /// Label the bundle belongs to (usually a scene key)
    pub label: String,
    /// Payload
    pub bytes: Arc<[u8]>,
}

/// Downloaded-content cache keyed by bundle id.
///
/// Labels group bundles for [`CacheEngine::clear_label`]; labels marked in use survive
/// [`CacheEngine::clean_unused`].
#[derive(Clone)]
pub struct MokaContentCache {
    inner: Cache<String, CachedBundle>,
    in_use: Arc<Mutex<BTreeSet<String>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

impl MokaContentCache {
    /// Create cache with max entry capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self::from_cache(Cache::new(max_capacity))
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self::from_cache(
            Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        )
    }

    fn from_cache(inner: Cache<String, CachedBundle>) -> Self {
        Self {
            inner,
            in_use: Arc::new(Mutex::new(BTreeSet::new())),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Store a bundle
    pub async fn insert(&self, id: impl Into<String>, label: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        let bundle = CachedBundle {
            label: label.into(),
            bytes: bytes.into(),
        };
        self.inner.insert(id.into(), bundle).await;
    }

    /// Fetch a bundle
    #[inline]
    pub async fn get(&self, id: &str) -> Option<CachedBundle> {
        self.inner.get(id).await
    }

    /// Whether a bundle is cached
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// Number of cached bundles after pending maintenance has run
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    /// Whether nothing is cached
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Protect a label from `clean_unused`
    pub fn mark_in_use(&self, label: impl Into<String>) {
        self.in_use.lock().insert(label.into());
    }

    /// Drop the protection added by [`Self::mark_in_use`]
    pub fn release(&self, label: &str) {
        self.in_use.lock().remove(label);
    }

    /// Make the next engine call fail with `message`
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    fn injected_failure(&self) -> Result<(), BoxError> {
        match self.fail_next.lock().take() {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }

    async fn invalidate_where(&self, mut doomed: impl FnMut(&CachedBundle) -> bool) -> usize {
        let ids: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(_, bundle)| doomed(bundle))
            .map(|(id, _)| id)
            .collect();
        for id in &ids {
            self.inner.invalidate(id.as_str()).await;
        }
        self.inner.run_pending_tasks().await;
        ids.len()
    }
}

#[async_trait]
impl CacheEngine for MokaContentCache {
    async fn clear_all(&self) -> Result<(), BoxError> {
        self.injected_failure()?;
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        tracing::debug!("Content cache cleared");
        Ok(())
    }

    async fn clear_label(&self, label: &str) -> Result<(), BoxError> {
        self.injected_failure()?;
        let removed = self.invalidate_where(|bundle| bundle.label == label).await;
        tracing::debug!("Content cache: removed {} bundles labelled '{}'", removed, label);
        Ok(())
    }

    async fn clean_unused(&self) -> Result<(), BoxError> {
        self.injected_failure()?;
        let in_use = self.in_use.lock().clone();
        let removed = self.invalidate_where(|bundle| !in_use.contains(&bundle.label)).await;
        tracing::debug!("Content cache: removed {} unused bundles", removed);
        Ok(())
    }
}

impl std::fmt::Debug for MokaContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaContentCache")
            .field("entry_count", &self.inner.entry_count())
            .field("in_use", &*self.in_use.lock())
            .finish_non_exhaustive()
    }
}
