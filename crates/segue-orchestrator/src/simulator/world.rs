//! In-memory engine: scene loading and scene-graph bookkeeping

use super::collaborators::SimulatedPresenter;
use crate::cancel::sleep;
use async_trait::async_trait;
use parking_lot::Mutex;
use segue_core::types::duration_ms;
use segue_core::{
    AsyncOperation, BoxError, FailureCode, LoadMode, LoadOptions, LoadingScreenPresenter, ObjectId,
    SceneGraph, SceneHandle, SceneKey, SceneLoader, TransitionArgs, TransitionError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failure a simulated scene raises halfway through its load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectedFailure {
    /// Typed failure that passes through classification unchanged
    Typed { code: FailureCode, message: String },
    /// Plain message left to the classifier
    Untyped { message: String },
}

impl InjectedFailure {
    fn to_error(&self) -> BoxError {
        match self {
            InjectedFailure::Typed { code, message } => Box::new(TransitionError::new(*code, message.clone())),
            InjectedFailure::Untyped { message } => message.clone().into(),
        }
    }
}

/// Behavior of one simulated scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSpec {
    #[serde(with = "duration_ms", rename = "load_time_ms")]
    pub load_time: Duration,
    #[serde(with = "duration_ms", rename = "unload_time_ms")]
    pub unload_time: Duration,
    /// Progress reports per load
    pub progress_steps: u32,
    /// Objects spawned into the active scene halfway through the load
    pub spawn_during_load: usize,
    pub failure: Option<InjectedFailure>,
    /// Load never finishes on its own
    pub hang_on_load: bool,
    /// Unload never finishes on its own
    pub hang_on_unload: bool,
    /// Poll count before an engine-level unload reports done
    pub unload_polls: u32,
    /// Hosts a loading-screen presenter
    pub presenter: bool,
    /// Message the destination fails activation with
    pub activation_failure: Option<String>,
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            load_time: Duration::ZERO,
            unload_time: Duration::ZERO,
            progress_steps: 4,
            spawn_during_load: 0,
            failure: None,
            hang_on_load: false,
            hang_on_unload: false,
            unload_polls: 0,
            presenter: false,
            activation_failure: None,
        }
    }
}

impl SceneSpec {
    #[inline]
    #[must_use]
    pub fn with_load_time(mut self, load_time: Duration) -> Self {
        self.load_time = load_time;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_unload_time(mut self, unload_time: Duration) -> Self {
        self.unload_time = unload_time;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_spawns(mut self, count: usize) -> Self {
        self.spawn_during_load = count;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_failure(mut self, failure: InjectedFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Typed failure shorthand
    #[inline]
    #[must_use]
    pub fn failing(self, code: FailureCode, message: impl Into<String>) -> Self {
        self.with_failure(InjectedFailure::Typed {
            code,
            message: message.into(),
        })
    }

    #[inline]
    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.hang_on_load = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn hanging_unload(mut self) -> Self {
        self.hang_on_unload = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_presenter(mut self) -> Self {
        self.presenter = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_activation_failure(mut self, message: impl Into<String>) -> Self {
        self.activation_failure = Some(message.into());
        self
    }
}

/// Observable engine event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEvent {
    LoadStarted { scene: SceneKey, mode: LoadMode },
    Loaded { scene: SceneKey },
    LoadFailed { scene: SceneKey, reason: String },
    Unloaded { scene: SceneKey },
    Created { scene: SceneKey },
    ActiveChanged { scene: SceneKey },
    Activated { scene: SceneKey, args: TransitionArgs },
    Spawned { object: ObjectId, scene: SceneKey },
    Moved { object: ObjectId, scene: SceneKey },
}

struct SimScene {
    handle: SceneHandle,
    loaded: bool,
    objects: Vec<ObjectId>,
    presenter: Option<Arc<SimulatedPresenter>>,
}

#[derive(Default)]
struct WorldState {
    specs: BTreeMap<SceneKey, SceneSpec>,
    scenes: BTreeMap<u64, SimScene>,
    active: Option<u64>,
    next_scene_id: u64,
    next_object_id: u64,
    log: Vec<WorldEvent>,
}

impl WorldState {
    fn scene(&self, handle: &SceneHandle) -> Option<&SimScene> {
        self.scenes.get(&handle.id()).filter(|s| s.handle == *handle)
    }

    fn scene_mut(&mut self, handle: &SceneHandle) -> Option<&mut SimScene> {
        self.scenes.get_mut(&handle.id()).filter(|s| s.handle == *handle)
    }

    fn insert(&mut self, key: SceneKey, loaded: bool) -> SceneHandle {
        self.next_scene_id += 1;
        let handle = SceneHandle::new(self.next_scene_id, key);
        self.scenes.insert(
            handle.id(),
            SimScene {
                handle: handle.clone(),
                loaded,
                objects: Vec::new(),
                presenter: None,
            },
        );
        handle
    }

    fn remove(&mut self, handle: &SceneHandle) -> bool {
        if self.scene(handle).is_none() {
            return false;
        }
        self.scenes.remove(&handle.id());
        if self.active == Some(handle.id()) {
            self.active = None;
        }
        true
    }

    fn spawn_into_active(&mut self) -> Option<ObjectId> {
        let active = self.active?;
        self.next_object_id += 1;
        let object = ObjectId(self.next_object_id);
        let scene = self.scenes.get_mut(&active)?;
        scene.objects.push(object);
        let key = scene.handle.key().clone();
        self.log.push(WorldEvent::Spawned { object, scene: key });
        Some(object)
    }
}

/// In-memory engine implementing [`SceneLoader`] and [`SceneGraph`]
#[derive(Default)]
pub struct SimulatedWorld {
    state: Mutex<WorldState>,
}

impl SimulatedWorld {
    /// Empty world
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Declare a loadable scene
    pub fn define(&self, key: impl Into<SceneKey>, spec: SceneSpec) {
        self.state.lock().specs.insert(key.into(), spec);
    }

    /// Current spec of a scene
    #[must_use]
    pub fn spec(&self, key: &SceneKey) -> Option<SceneSpec> {
        self.state.lock().specs.get(key).cloned()
    }

    /// Replace the injected failure of a declared scene
    pub fn set_failure(&self, key: &SceneKey, failure: Option<InjectedFailure>) {
        if let Some(spec) = self.state.lock().specs.get_mut(key) {
            spec.failure = failure;
        }
    }

    /// Load a scene instantly; the first preloaded scene becomes active
    pub fn preload(&self, key: impl Into<SceneKey>) -> SceneHandle {
        let key = key.into();
        let mut state = self.state.lock();
        let handle = state.insert(key.clone(), true);
        if state.active.is_none() {
            state.active = Some(handle.id());
        }
        state.log.push(WorldEvent::Loaded { scene: key });
        handle
    }

    /// Key of the active scene
    #[must_use]
    pub fn active_key(&self) -> Option<SceneKey> {
        self.active_scene().map(|scene| scene.key().clone())
    }

    /// Loaded instances of a key
    #[must_use]
    pub fn count_loaded(&self, key: &SceneKey) -> usize {
        self.state
            .lock()
            .scenes
            .values()
            .filter(|s| s.loaded && s.handle.key() == key)
            .count()
    }

    /// Keys of loaded scenes, in load order
    #[must_use]
    pub fn loaded_keys(&self) -> Vec<SceneKey> {
        self.loaded_scenes().into_iter().map(|s| s.key().clone()).collect()
    }

    /// Remove a scene out from under whoever holds its handle
    pub fn destroy(&self, scene: &SceneHandle) {
        self.state.lock().remove(scene);
    }

    /// Spawn one object into the active scene
    pub fn spawn_into_active(&self) -> Option<ObjectId> {
        self.state.lock().spawn_into_active()
    }

    /// Presenter hosted by a loaded scene key
    #[must_use]
    pub fn presenter_of(&self, key: &SceneKey) -> Option<Arc<SimulatedPresenter>> {
        self.state
            .lock()
            .scenes
            .values()
            .find(|s| s.handle.key() == key)
            .and_then(|s| s.presenter.clone())
    }

    /// Everything that happened so far
    #[must_use]
    pub fn log(&self) -> Vec<WorldEvent> {
        self.state.lock().log.clone()
    }

    fn push_log(&self, event: WorldEvent) {
        self.state.lock().log.push(event);
    }

    async fn run_load(
        &self,
        handle: &SceneHandle,
        spec: &SceneSpec,
        options: &LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let what = format!("loading {}", handle.key());
        if spec.hang_on_load {
            cancel.cancelled().await;
            return Err(Box::new(TransitionError::canceled(what)));
        }

        let steps = spec.progress_steps.max(1);
        let slice = spec.load_time / steps;
        let midpoint = steps.div_ceil(2);
        for step in 1..=steps {
            sleep(cancel, slice, &what).await?;
            if step == midpoint {
                {
                    let mut state = self.state.lock();
                    for _ in 0..spec.spawn_during_load {
                        state.spawn_into_active();
                    }
                }
                if let Some(failure) = &spec.failure {
                    return Err(failure.to_error());
                }
            }
            #[allow(clippy::cast_precision_loss)]
            options.report(step as f32 / steps as f32);
        }
        Ok(())
    }
}

#[async_trait]
impl SceneLoader for SimulatedWorld {
    async fn load(
        &self,
        scene: &SceneKey,
        options: LoadOptions,
        cancel: &CancellationToken,
    ) -> Result<SceneHandle, BoxError> {
        let Some(spec) = self.spec(scene) else {
            return Err(Box::new(TransitionError::new(
                FailureCode::ContentNotFound,
                format!("no scene named '{scene}'"),
            )));
        };

        let handle = {
            let mut state = self.state.lock();
            state.log.push(WorldEvent::LoadStarted {
                scene: scene.clone(),
                mode: options.mode,
            });
            state.insert(scene.clone(), false)
        };

        let mut pending = PendingLoad {
            world: self,
            handle: Some(handle.clone()),
        };
        let result = self.run_load(&handle, &spec, &options, cancel).await;
        pending.handle = None;

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                if let Some(entry) = state.scene_mut(&handle) {
                    entry.loaded = true;
                    if spec.presenter {
                        entry.presenter = Some(Arc::new(SimulatedPresenter::default()));
                    }
                }
                state.log.push(WorldEvent::Loaded { scene: scene.clone() });
                Ok(handle)
            }
            Err(e) => {
                state.remove(&handle);
                state.log.push(WorldEvent::LoadFailed {
                    scene: scene.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn unload(&self, scene: &SceneHandle, cancel: &CancellationToken) -> Result<(), BoxError> {
        let spec = {
            let state = self.state.lock();
            if state.scene(scene).is_none() {
                return Err(format!("scene {scene} is not loaded").into());
            }
            state.specs.get(scene.key()).cloned().unwrap_or_default()
        };

        let what = format!("unloading {scene}");
        if spec.hang_on_unload {
            cancel.cancelled().await;
            return Err(Box::new(TransitionError::canceled(what)));
        }
        sleep(cancel, spec.unload_time, &what).await?;

        let mut state = self.state.lock();
        if state.remove(scene) {
            state.log.push(WorldEvent::Unloaded {
                scene: scene.key().clone(),
            });
        }
        Ok(())
    }

    async fn activate(&self, scene: &SceneHandle, args: &TransitionArgs) -> Result<(), BoxError> {
        let failure = self.spec(scene.key()).and_then(|spec| spec.activation_failure);
        if let Some(message) = failure {
            return Err(message.into());
        }
        self.push_log(WorldEvent::Activated {
            scene: scene.key().clone(),
            args: args.clone(),
        });
        Ok(())
    }

    fn loading_screen_presenter(&self, scene: &SceneHandle) -> Option<Arc<dyn LoadingScreenPresenter>> {
        let state = self.state.lock();
        let presenter = state.scene(scene)?.presenter.clone()?;
        Some(presenter)
    }
}

impl SceneGraph for SimulatedWorld {
    fn active_scene(&self) -> Option<SceneHandle> {
        let state = self.state.lock();
        let active = state.active?;
        state.scenes.get(&active).map(|s| s.handle.clone())
    }

    fn set_active_scene(&self, scene: &SceneHandle) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        match state.scene(scene) {
            Some(entry) if entry.loaded => {}
            _ => return Err(format!("cannot activate {scene}: not loaded").into()),
        }
        state.active = Some(scene.id());
        state.log.push(WorldEvent::ActiveChanged {
            scene: scene.key().clone(),
        });
        Ok(())
    }

    fn loaded_scenes(&self) -> Vec<SceneHandle> {
        self.state
            .lock()
            .scenes
            .values()
            .filter(|s| s.loaded)
            .map(|s| s.handle.clone())
            .collect()
    }

    fn is_valid(&self, scene: &SceneHandle) -> bool {
        self.state.lock().scene(scene).is_some()
    }

    fn is_loaded(&self, scene: &SceneHandle) -> bool {
        self.state.lock().scene(scene).is_some_and(|s| s.loaded)
    }

    fn create_scene(&self, name: &str) -> Result<SceneHandle, BoxError> {
        if name.is_empty() {
            return Err("scene name must not be empty".into());
        }
        let mut state = self.state.lock();
        let handle = state.insert(SceneKey::from(name), true);
        state.log.push(WorldEvent::Created {
            scene: handle.key().clone(),
        });
        Ok(handle)
    }

    fn root_objects(&self, scene: &SceneHandle) -> Vec<ObjectId> {
        self.state
            .lock()
            .scene(scene)
            .map(|s| s.objects.clone())
            .unwrap_or_default()
    }

    fn move_to_scene(&self, object: ObjectId, scene: &SceneHandle) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if state.scene(scene).is_none() {
            return Err(format!("cannot move {object:?} into missing scene {scene}").into());
        }
        let Some(owner) = state.scenes.values_mut().find(|s| s.objects.contains(&object)) else {
            return Err(format!("object {object:?} does not exist").into());
        };
        owner.objects.retain(|o| *o != object);
        if let Some(target) = state.scene_mut(scene) {
            target.objects.push(object);
        }
        state.log.push(WorldEvent::Moved {
            object,
            scene: scene.key().clone(),
        });
        Ok(())
    }

    fn begin_unload(&self, scene: &SceneHandle) -> Result<Box<dyn AsyncOperation>, BoxError> {
        let mut state = self.state.lock();
        let polls = state.specs.get(scene.key()).map_or(0, |spec| spec.unload_polls);
        if !state.remove(scene) {
            return Err(format!("scene {scene} is not loaded").into());
        }
        state.log.push(WorldEvent::Unloaded {
            scene: scene.key().clone(),
        });
        Ok(Box::new(SimulatedUnload {
            remaining: AtomicU32::new(polls),
        }))
    }
}

/// Removes a half-loaded scene if the load future is dropped
struct PendingLoad<'a> {
    world: &'a SimulatedWorld,
    handle: Option<SceneHandle>,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let mut state = self.world.state.lock();
            if state.remove(&handle) {
                state.log.push(WorldEvent::LoadFailed {
                    scene: handle.key().clone(),
                    reason: "load abandoned".to_string(),
                });
            }
        }
    }
}

/// Engine unload that reports done after a fixed number of polls
struct SimulatedUnload {
    remaining: AtomicU32,
}

impl AsyncOperation for SimulatedUnload {
    fn is_done(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}
