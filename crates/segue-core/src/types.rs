//! Core value types
//!
//! Scene keys and handles, load/unload/cache modes, timing parameters and the
//! argument bag handed to a destination.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use ulid::Ulid;

/// Name of a loadable content unit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneKey(String);

impl SceneKey {
    /// Create a key
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SceneKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SceneKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for SceneKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a loaded content unit.
///
/// The id distinguishes two loads of the same key; it is assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneHandle {
    id: u64,
    key: SceneKey,
}

impl SceneHandle {
    /// Create a handle (engine side)
    #[inline]
    #[must_use]
    pub fn new(id: u64, key: SceneKey) -> Self {
        Self { id, key }
    }

    /// Engine-assigned id
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key it was loaded from
    #[inline]
    #[must_use]
    pub fn key(&self) -> &SceneKey {
        &self.key
    }
}

impl fmt::Display for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.id)
    }
}

/// Top-level object living in a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// External synchronization gate identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateId(String);

impl GateId {
    /// Gate used when only a timeout is configured
    pub const DEFAULT_NAME: &'static str = "scene-activation";

    /// Create a gate id
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GateId {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique id of one transition run (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub Ulid);

impl TransitionId {
    /// Generate new id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TransitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the destination is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Destination replaces the origin content
    #[default]
    Single,
    /// Destination is loaded next to existing content
    Additive,
}

/// Which currently-loaded scenes the unload step removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadPolicy {
    /// Unload nothing
    KeepAll,
    /// Unload only the scene active when the transition started
    #[default]
    ActiveOnly,
    /// Unload every loaded scene
    AllLoaded,
}

/// Cache operation run during the `CleaningCache` phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheClearMode {
    /// No cache work
    #[default]
    None,
    /// Drop every cached entry
    All,
    /// Drop entries for the resolved cache key
    ByLabel,
    /// Opportunistically drop unused entries
    CleanUnused,
}

/// Caller-supplied arguments handed to the destination on activation
pub type TransitionArgs = BTreeMap<String, serde_json::Value>;

/// Per-phase delays and fade durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionTimings {
    /// Pause before the entry fade starts
    #[serde(with = "duration_ms", rename = "before_entry_fade_ms")]
    pub before_entry_fade: Duration,
    /// Entry fade duration
    #[serde(with = "duration_ms", rename = "entry_fade_ms")]
    pub entry_fade: Duration,
    /// Pause after the entry fade
    #[serde(with = "duration_ms", rename = "after_entry_fade_ms")]
    pub after_entry_fade: Duration,
    /// Pause between loading and activation
    #[serde(with = "duration_ms", rename = "before_activation_ms")]
    pub before_activation: Duration,
    /// Exit fade duration
    #[serde(with = "duration_ms", rename = "exit_fade_ms")]
    pub exit_fade: Duration,
}

impl TransitionTimings {
    /// All phases instantaneous
    #[inline]
    #[must_use]
    pub fn instant() -> Self {
        Self::default()
    }

    /// Same fade duration in both directions, no delays
    #[inline]
    #[must_use]
    pub fn fades(duration: Duration) -> Self {
        Self {
            entry_fade: duration,
            exit_fade: duration,
            ..Self::default()
        }
    }
}

/// Serde helper: `Duration` as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as whole milliseconds
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize from whole milliseconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serde helper: `Option<Duration>` as optional integer milliseconds
pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as optional whole milliseconds
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from optional whole milliseconds
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_millis))
    }
}
