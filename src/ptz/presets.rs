//! Preset storage: the bounded per-profile arrays and their persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAX_PROFILES: usize = 4;
pub const MAX_PRESETS_PER_PROFILE: usize = 4;

/// A stored position, in normalized pan/tilt space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub token: String,
    pub name: String,
    pub pan: f32,
    pub tilt: f32,
}

/// Up to [`MAX_PRESETS_PER_PROFILE`] presets, packed at the front.
///
/// Slots `0..len` are always occupied; removal shifts later entries left so
/// there are never gaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePresets {
    slots: [Option<Preset>; MAX_PRESETS_PER_PROFILE],
    count: usize,
}

impl ProfilePresets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills from persisted entries. Extra entries beyond capacity are dropped.
    pub fn from_presets(presets: Vec<Preset>) -> Self {
        let mut out = Self::new();
        let total = presets.len();
        for preset in presets.into_iter().take(MAX_PRESETS_PER_PROFILE) {
            out.slots[out.count] = Some(preset);
            out.count += 1;
        }
        if total > MAX_PRESETS_PER_PROFILE {
            tracing::warn!(
                stored = total,
                kept = MAX_PRESETS_PER_PROFILE,
                "Stored presets exceed profile capacity"
            );
        }
        out
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == MAX_PRESETS_PER_PROFILE
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.slots[..self.count].iter().flatten()
    }

    pub fn position(&self, token: &str) -> Option<usize> {
        self.iter().position(|p| p.token == token)
    }

    pub fn get(&self, token: &str) -> Option<&Preset> {
        self.iter().find(|p| p.token == token)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut Preset> {
        if index < self.count {
            self.slots[index].as_mut()
        } else {
            None
        }
    }

    /// Appends, returning the slot index used.
    pub fn push(&mut self, preset: Preset) -> Result<usize> {
        if self.is_full() {
            return Err(Error::ResourceExhausted(format!(
                "profile already holds {} presets",
                MAX_PRESETS_PER_PROFILE
            )));
        }
        let index = self.count;
        self.slots[index] = Some(preset);
        self.count += 1;
        Ok(index)
    }

    /// Removes slot `index`, shifting the following entries left.
    pub fn remove(&mut self, index: usize) -> Option<Preset> {
        if index >= self.count {
            return None;
        }
        let removed = self.slots[index].take();
        self.slots[index..self.count].rotate_left(1);
        self.count -= 1;
        removed
    }

    /// Puts `preset` back at `index`, undoing a [`remove`](Self::remove).
    pub(crate) fn insert(&mut self, index: usize, preset: Preset) -> Result<()> {
        if self.is_full() || index > self.count {
            return Err(Error::Internal("preset slot out of range".to_string()));
        }
        self.slots[index..=self.count].rotate_right(1);
        self.slots[index] = Some(preset);
        self.count += 1;
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<Preset> {
        self.iter().cloned().collect()
    }
}

/// Persistent home of the preset lists, keyed by profile index.
pub trait PresetStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored for `profile` yet.
    fn load(&self, profile: usize) -> Result<Option<Vec<Preset>>>;

    fn save(&self, profile: usize, presets: &[Preset]) -> Result<()>;
}

/// Volatile store with switchable failures, for tests and diskless runs.
#[derive(Debug, Default)]
pub struct MemoryPresetStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    profiles: BTreeMap<usize, Vec<Preset>>,
    fail_loads: bool,
    fail_saves: bool,
    loads: usize,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: usize, presets: Vec<Preset>) -> Self {
        self.inner.lock().profiles.insert(profile, presets);
        self
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.lock().fail_saves = fail;
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.inner.lock().fail_loads = fail;
    }

    pub fn stored(&self, profile: usize) -> Option<Vec<Preset>> {
        self.inner.lock().profiles.get(&profile).cloned()
    }

    /// How many `load` calls have been served.
    pub fn load_count(&self) -> usize {
        self.inner.lock().loads
    }
}

impl PresetStore for MemoryPresetStore {
    fn load(&self, profile: usize) -> Result<Option<Vec<Preset>>> {
        let mut inner = self.inner.lock();
        if inner.fail_loads {
            return Err(Error::Internal("preset storage unavailable".to_string()));
        }
        inner.loads += 1;
        Ok(inner.profiles.get(&profile).cloned())
    }

    fn save(&self, profile: usize, presets: &[Preset]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            return Err(Error::Internal("preset storage unavailable".to_string()));
        }
        inner.profiles.insert(profile, presets.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    profiles: BTreeMap<usize, Vec<Preset>>,
}

/// Presets kept in a YAML file, rewritten in full on every save.
#[derive(Debug)]
pub struct YamlPresetStore {
    path: PathBuf,
    // serialises read-modify-write of the file
    lock: Mutex<()>,
}

impl YamlPresetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<PresetFile>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Internal(format!("reading presets: {}", e))),
        };
        if text.trim().is_empty() {
            return Ok(Some(PresetFile::default()));
        }
        serde_yaml::from_str(&text)
            .map(Some)
            .map_err(|e| Error::Internal(format!("parsing presets: {}", e)))
    }
}

impl PresetStore for YamlPresetStore {
    fn load(&self, profile: usize) -> Result<Option<Vec<Preset>>> {
        let _guard = self.lock.lock();
        Ok(self
            .read()?
            .and_then(|mut file| file.profiles.remove(&profile)))
    }

    fn save(&self, profile: usize, presets: &[Preset]) -> Result<()> {
        let _guard = self.lock.lock();
        let mut file = self.read()?.unwrap_or_default();
        file.profiles.insert(profile, presets.to_vec());

        let text = serde_yaml::to_string(&file)
            .map_err(|e| Error::Internal(format!("encoding presets: {}", e)))?;

        // write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("yaml.tmp");
        std::fs::write(&tmp, text)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Internal(format!("writing presets: {}", e)))
    }
}
