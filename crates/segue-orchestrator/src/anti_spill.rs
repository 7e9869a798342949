//! AntiSpill - temporary container for objects spawned mid-load
//!
//! Asynchronous loads that straddle a scene boundary instantiate objects into whatever
//! scene is active at that instant. Preparing a throwaway container and making it active
//! catches those objects; flushing moves them to the destination once it exists.
//!
//! Flushing is not transactional: objects already moved stay moved if cancellation
//! interrupts the loop, since they are correctly parented either way.

use crate::cancel::{ensure_active, sleep};
use segue_core::{
    AntiSpillConfig, FailureCode, SceneGraph, SceneHandle, TransitionError,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of one [`AntiSpill::flush_to`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Objects reparented into the destination
    pub moved: usize,
    /// Container was unloaded afterwards
    pub unloaded: bool,
}

/// Spill container manager
pub struct AntiSpill {
    scenes: Arc<dyn SceneGraph>,
    default_name: String,
    poll_interval: Duration,
    container: Option<SceneHandle>,
    name: Option<String>,
}

impl AntiSpill {
    /// Create a manager over an engine's scene graph
    #[must_use]
    pub fn new(scenes: Arc<dyn SceneGraph>, config: &AntiSpillConfig) -> Self {
        Self {
            scenes,
            default_name: config.name.clone(),
            poll_interval: config.poll_interval,
            container: None,
            name: None,
        }
    }

    /// Currently held container
    #[inline]
    #[must_use]
    pub fn container(&self) -> Option<&SceneHandle> {
        self.container.as_ref()
    }

    /// Whether a container is held
    #[inline]
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.container.is_some()
    }

    fn is_usable(&self, scene: &SceneHandle) -> bool {
        self.scenes.is_valid(scene) && self.scenes.is_loaded(scene)
    }

    /// Create the container and make it active.
    ///
    /// No-op while the held container is still valid and loaded; an invalid one is
    /// recreated.
    pub fn prepare(&mut self, name: Option<&str>) -> Result<SceneHandle, TransitionError> {
        if let Some(container) = &self.container {
            if self.is_usable(container) {
                return Ok(container.clone());
            }
            tracing::debug!("Spill container {} went invalid; recreating", container);
            self.container = None;
        }

        let name = name
            .map(str::to_owned)
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.default_name.clone());

        let container = self
            .scenes
            .create_scene(&name)
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::InitializationCrashed))?;
        self.scenes
            .set_active_scene(&container)
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::InitializationCrashed))?;

        tracing::debug!("Prepared spill container {}", container);
        self.container = Some(container.clone());
        self.name = Some(name);
        Ok(container)
    }

    /// Move every object caught by the container into `destination`, optionally
    /// unloading the container afterwards.
    ///
    /// No-op if never prepared or the destination is not valid and loaded.
    pub async fn flush_to(
        &mut self,
        destination: &SceneHandle,
        unload: bool,
        cancel: &CancellationToken,
    ) -> Result<FlushReport, TransitionError> {
        if self.container.is_none() {
            return Ok(FlushReport::default());
        }
        if !self.is_usable(destination) {
            tracing::debug!("Flush target {} is not loaded; leaving spill container alone", destination);
            return Ok(FlushReport::default());
        }

        let container = match self.revalidate() {
            Some(container) => container,
            None => {
                tracing::warn!("Spill container could not be recovered; nothing flushed");
                return Ok(FlushReport::default());
            }
        };

        let mut report = FlushReport::default();
        for object in self.scenes.root_objects(&container) {
            ensure_active(cancel, "spill flush")?;
            self.scenes
                .move_to_scene(object, destination)
                .map_err(|e| TransitionError::from_collaborator(e, FailureCode::SceneLoadFailed))?;
            report.moved += 1;
        }
        if report.moved > 0 {
            tracing::debug!("Moved {} spilled objects into {}", report.moved, destination);
        }

        if unload {
            self.unload_container(&container, cancel).await?;
            report.unloaded = true;
        }
        Ok(report)
    }

    /// Unload the container without migrating anything
    pub async fn discard(&mut self, cancel: &CancellationToken) -> Result<bool, TransitionError> {
        let Some(container) = self.container.clone() else {
            return Ok(false);
        };
        if !self.scenes.is_valid(&container) {
            self.container = None;
            return Ok(false);
        }
        self.unload_container(&container, cancel).await?;
        Ok(true)
    }

    fn revalidate(&mut self) -> Option<SceneHandle> {
        if let Some(container) = self.container.clone() {
            if self.is_usable(&container) {
                return Some(container);
            }
        }
        // Re-preparing activates the new container; the caller's active scene wins
        let active = self.scenes.active_scene().filter(|scene| self.is_usable(scene));
        let name = self.name.clone();
        match self.prepare(name.as_deref()) {
            Ok(container) => {
                if let Some(active) = active {
                    if let Err(e) = self.scenes.set_active_scene(&active) {
                        tracing::warn!("Restoring active scene {} after re-prepare failed: {}", active, e);
                    }
                }
                Some(container)
            }
            Err(e) => {
                tracing::warn!("Re-preparing spill container failed: {}", e);
                self.container = None;
                None
            }
        }
    }

    async fn unload_container(
        &mut self,
        container: &SceneHandle,
        cancel: &CancellationToken,
    ) -> Result<(), TransitionError> {
        let operation = self
            .scenes
            .begin_unload(container)
            .map_err(|e| TransitionError::from_collaborator(e, FailureCode::Unknown))?;

        while !operation.is_done() {
            sleep(cancel, self.poll_interval, "spill container unload").await?;
        }

        tracing::debug!("Unloaded spill container {}", container);
        self.container = None;
        Ok(())
    }
}

impl fmt::Debug for AntiSpill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AntiSpill")
            .field("default_name", &self.default_name)
            .field("poll_interval", &self.poll_interval)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SceneSpec, SimulatedWorld};
    use segue_core::SceneKey;

    fn world() -> Arc<SimulatedWorld> {
        let world = SimulatedWorld::new();
        world.define("title", SceneSpec::default());
        world.define("level-1", SceneSpec::default());
        world.preload("title");
        world
    }

    fn anti_spill(world: &Arc<SimulatedWorld>) -> AntiSpill {
        AntiSpill::new(world.clone(), &AntiSpillConfig::default())
    }

    #[test]
    fn prepare_is_idempotent() {
        let world = world();
        let mut spill = anti_spill(&world);

        let first = spill.prepare(None).unwrap();
        let second = spill.prepare(Some("ignored")).unwrap();

        assert_eq!(first, second);
        assert_eq!(world.active_key().unwrap().as_str(), AntiSpillConfig::DEFAULT_NAME);
        assert_eq!(world.count_loaded(&SceneKey::from(AntiSpillConfig::DEFAULT_NAME)), 1);
    }

    #[test]
    fn prepare_recreates_invalid_container() {
        let world = world();
        let mut spill = anti_spill(&world);

        let first = spill.prepare(None).unwrap();
        world.destroy(&first);
        let second = spill.prepare(None).unwrap();

        assert_ne!(first, second);
        assert!(world.is_valid(&second));
    }

    #[tokio::test]
    async fn flush_moves_objects_in_order_and_unloads() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);
        let container = spill.prepare(None).unwrap();

        let spawned: Vec<_> = (0..3).map(|_| world.spawn_into_active().unwrap()).collect();
        let cancel = CancellationToken::new();
        let report = spill.flush_to(&dest, true, &cancel).await.unwrap();

        assert_eq!(report, FlushReport { moved: 3, unloaded: true });
        assert_eq!(world.root_objects(&dest), spawned);
        assert!(!world.is_valid(&container));
        assert!(!spill.is_prepared());
    }

    #[tokio::test]
    async fn second_flush_is_a_no_op() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);
        spill.prepare(None).unwrap();
        world.spawn_into_active().unwrap();

        let cancel = CancellationToken::new();
        spill.flush_to(&dest, true, &cancel).await.unwrap();
        let again = spill.flush_to(&dest, true, &cancel).await.unwrap();

        assert_eq!(again, FlushReport::default());
        assert_eq!(world.root_objects(&dest).len(), 1);
    }

    #[tokio::test]
    async fn flush_without_unload_twice_is_harmless() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);
        spill.prepare(None).unwrap();
        world.spawn_into_active().unwrap();

        let cancel = CancellationToken::new();
        let first = spill.flush_to(&dest, false, &cancel).await.unwrap();
        let second = spill.flush_to(&dest, false, &cancel).await.unwrap();

        assert_eq!(first.moved, 1);
        assert_eq!(second, FlushReport::default());
        assert!(spill.is_prepared());
    }

    #[tokio::test]
    async fn flush_after_container_vanished_keeps_destination_active() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);
        let lost = spill.prepare(None).unwrap();
        world.spawn_into_active().unwrap();
        world.destroy(&lost);
        world.set_active_scene(&dest).unwrap();
        let existing = world.spawn_into_active().unwrap();

        let report = spill.flush_to(&dest, true, &CancellationToken::new()).await.unwrap();

        assert_eq!(report, FlushReport { moved: 0, unloaded: true });
        assert_eq!(world.active_scene(), Some(dest.clone()));
        assert_eq!(world.root_objects(&dest), vec![existing]);
        assert!(!spill.is_prepared());
        assert_eq!(world.count_loaded(&SceneKey::from(AntiSpillConfig::DEFAULT_NAME)), 0);
    }

    #[tokio::test]
    async fn never_prepared_flush_is_a_no_op() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);

        let report = spill.flush_to(&dest, true, &CancellationToken::new()).await.unwrap();
        assert_eq!(report, FlushReport::default());
    }

    #[tokio::test]
    async fn unloaded_destination_is_a_no_op() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);
        spill.prepare(None).unwrap();
        world.spawn_into_active().unwrap();
        world.destroy(&dest);

        let report = spill.flush_to(&dest, true, &CancellationToken::new()).await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert!(spill.is_prepared());
    }

    #[tokio::test]
    async fn canceled_flush_propagates() {
        let world = world();
        let dest = world.preload("level-1");
        let mut spill = anti_spill(&world);
        spill.prepare(None).unwrap();
        world.spawn_into_active().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = spill.flush_to(&dest, true, &cancel).await.unwrap_err();

        assert!(err.is_canceled());
        assert!(spill.is_prepared());
    }

    #[tokio::test]
    async fn discard_unloads_without_moving() {
        let world = world();
        let mut spill = anti_spill(&world);
        let container = spill.prepare(None).unwrap();
        world.spawn_into_active().unwrap();

        assert!(spill.discard(&CancellationToken::new()).await.unwrap());
        assert!(!world.is_valid(&container));
        assert!(!spill.discard(&CancellationToken::new()).await.unwrap());
    }
}
