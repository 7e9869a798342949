use super::TransitionStep;
use crate::context::TransitionContext;
use async_trait::async_trait;
use segue_core::{CacheKeyResolver, TransitionError, TransitionStatus};
use tokio_util::sync::CancellationToken;

/// Runs the request's cache-clear mode against the resolved cache key
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanCacheStep;

#[async_trait]
impl TransitionStep for CleanCacheStep {
    fn name(&self) -> &'static str {
        "clean-cache"
    }

    async fn execute(&self, ctx: &mut TransitionContext, cancel: &CancellationToken) -> Result<(), TransitionError> {
        ctx.emit(TransitionStatus::CleaningCache);

        let Some(cache) = ctx.cache().cloned() else {
            tracing::warn!("Cache clear requested but no content cache is configured; skipping");
            return Ok(());
        };
        let request = ctx.request();
        let label = CacheKeyResolver::resolve_scene(&request.destination, request.cache_label.as_deref()).to_string();
        let mode = request.cache_clear_mode;

        if cache.apply(mode, &label, cancel).await? {
            tracing::debug!("Cache mode {:?} applied for '{}'", mode, label);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ContentCache, MokaContentCache};
    use crate::context::Collaborators;
    use crate::steps::test_support::{context, world};
    use segue_core::{CacheClearMode, FailureCode, TransitionRequest};
    use std::sync::Arc;

    async fn seeded() -> MokaContentCache {
        let engine = MokaContentCache::new(32);
        engine.insert("level-1/a", "level-1", &b"a"[..]).await;
        engine.insert("level-1-hd/a", "level-1-hd", &b"a"[..]).await;
        engine.insert("menu/a", "menu", &b"a"[..]).await;
        engine
    }

    fn collaborators(world: &Arc<crate::simulator::SimulatedWorld>, engine: &MokaContentCache) -> Collaborators {
        let mut collaborators = Collaborators::new(world.clone(), world.clone());
        collaborators.cache = Some(ContentCache::new(Arc::new(engine.clone())));
        collaborators
    }

    #[tokio::test]
    async fn by_label_defaults_to_destination_key() {
        let world = world();
        let engine = seeded().await;
        let request = TransitionRequest::new("level-1").with_cache_clear(CacheClearMode::ByLabel, None);
        let (mut ctx, _recorded) = context(&world, Some(collaborators(&world, &engine)), request);

        CleanCacheStep.execute(&mut ctx, &CancellationToken::new()).await.unwrap();

        assert!(!engine.contains("level-1/a"));
        assert!(engine.contains("level-1-hd/a"));
        assert!(engine.contains("menu/a"));
    }

    #[tokio::test]
    async fn by_label_prefers_explicit_label() {
        let world = world();
        let engine = seeded().await;
        let request = TransitionRequest::new("level-1")
            .with_cache_clear(CacheClearMode::ByLabel, Some("level-1-hd".to_string()));
        let (mut ctx, _recorded) = context(&world, Some(collaborators(&world, &engine)), request);

        CleanCacheStep.execute(&mut ctx, &CancellationToken::new()).await.unwrap();

        assert!(engine.contains("level-1/a"));
        assert!(!engine.contains("level-1-hd/a"));
    }

    #[tokio::test]
    async fn engine_failure_is_download_failure() {
        let world = world();
        let engine = seeded().await;
        engine.fail_next("cache directory is read-only");
        let request = TransitionRequest::new("level-1").with_cache_clear(CacheClearMode::All, None);
        let (mut ctx, _recorded) = context(&world, Some(collaborators(&world, &engine)), request);

        let err = CleanCacheStep.execute(&mut ctx, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), FailureCode::ContentDownloadFailed);
    }

    #[tokio::test]
    async fn missing_cache_is_skipped() {
        let world = world();
        let request = TransitionRequest::new("level-1").with_cache_clear(CacheClearMode::All, None);
        let (mut ctx, recorded) = context(&world, None, request);

        CleanCacheStep.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(recorded.statuses.lock().last(), Some(&TransitionStatus::CleaningCache));
    }
}
