//! Cache key resolution

use crate::types::SceneKey;

/// Decides what identifies a content unit for cache-clearing purposes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyResolver;

impl CacheKeyResolver {
    /// Preferred label when present and non-empty, otherwise the scene key.
    #[must_use]
    pub fn resolve<'a>(scene: &'a str, preferred_label: Option<&'a str>) -> &'a str {
        match preferred_label {
            Some(label) if !label.is_empty() => label,
            _ => scene,
        }
    }

    /// [`CacheKeyResolver::resolve`] over a scene key
    #[must_use]
    pub fn resolve_scene<'a>(scene: &'a SceneKey, preferred_label: Option<&'a str>) -> &'a str {
        Self::resolve(scene.as_str(), preferred_label)
    }
}
