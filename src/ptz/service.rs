use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::ptz::adapter::{PAN_RANGE_DEG, PtzAdapter, TILT_RANGE_DEG};
use crate::ptz::presets::{MAX_PROFILES, Preset, PresetStore, ProfilePresets};

/// Device speed used when a request carries none.
pub const DEFAULT_DEVICE_SPEED: f32 = 50.0;
pub const DEFAULT_CONTINUOUS_TIMEOUT_S: u32 = 10;
pub const MAX_PRESET_NAME_LEN: usize = 64;

const MIN_DEVICE_SPEED: f32 = 15.0;
const DEVICE_SPEED_SPAN: f32 = 85.0;

/// Naming conventions clients use for the same four media profiles.
const PROFILE_TOKEN_PREFIXES: [&str; 3] = ["ProfileToken", "Profile", "ptz_profile_"];

/// A point or vector in normalized pan/tilt space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PanTilt {
    pub x: f32,
    pub y: f32,
}

impl PanTilt {
    pub const HOME: PanTilt = PanTilt { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    Idle,
    Moving,
}

impl MoveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveStatus::Idle => "IDLE",
            MoveStatus::Moving => "MOVING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtzStatus {
    pub position: PanTilt,
    pub pan: MoveStatus,
    pub tilt: MoveStatus,
}

impl PtzStatus {
    pub fn pan_tilt(&self) -> MoveStatus {
        if self.pan == MoveStatus::Moving || self.tilt == MoveStatus::Moving {
            MoveStatus::Moving
        } else {
            MoveStatus::Idle
        }
    }
}

/// Maps a profile token to its index (0-3).
///
/// `Profile1`, `ProfileToken1` and `ptz_profile_1` all name the first
/// profile. Anything else is an invalid argument.
pub fn profile_index(token: &str) -> Result<usize> {
    PROFILE_TOKEN_PREFIXES
        .iter()
        .find_map(|prefix| {
            let digits = token.strip_prefix(prefix)?;
            if digits.len() != 1 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let n: usize = digits.parse().ok()?;
            (1..=MAX_PROFILES).contains(&n).then(|| n - 1)
        })
        .ok_or_else(|| Error::InvalidArgument(format!("unknown profile token '{}'", token)))
}

fn check_unit(value: f32, what: &str) -> Result<f32> {
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidArgument(format!("{} must be within [-1, 1]", what)))
    }
}

/// Normalized position to device degrees.
pub fn to_degrees(p: PanTilt) -> Result<(f32, f32)> {
    let x = check_unit(p.x, "pan")?;
    let y = check_unit(p.y, "tilt")?;
    Ok((x * PAN_RANGE_DEG, y * TILT_RANGE_DEG))
}

/// Normalized speed magnitude to the device's [15, 100] scale.
pub fn device_speed(normalized: f32) -> f32 {
    MIN_DEVICE_SPEED + normalized.abs() * DEVICE_SPEED_SPAN
}

/// Signed device speed for a continuous move. Zero maps to the slowest
/// positive speed.
pub fn velocity_to_device(normalized: f32) -> f32 {
    let speed = device_speed(normalized);
    if normalized < 0.0 { -speed } else { speed }
}

/// Milliseconds to whole seconds, with the default for anything below one.
pub fn timeout_seconds(timeout_ms: i64) -> u32 {
    let seconds = timeout_ms / 1000;
    if seconds <= 0 {
        DEFAULT_CONTINUOUS_TIMEOUT_S
    } else {
        u32::try_from(seconds).unwrap_or(u32::MAX)
    }
}

fn move_speed(speed: Option<f32>) -> Result<f32> {
    match speed {
        Some(s) if s.is_finite() && (0.0..=1.0).contains(&s.abs()) => Ok(device_speed(s)),
        Some(_) => Err(Error::InvalidArgument("speed must be within [0, 1]".to_string())),
        None => Ok(DEFAULT_DEVICE_SPEED),
    }
}

fn check_label(value: &str, what: &str) -> Result<()> {
    let len = value.chars().count();
    if len == 0 || len > MAX_PRESET_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "{} must be 1-{} characters",
            what, MAX_PRESET_NAME_LEN
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(format!("{} contains control characters", what)));
    }
    Ok(())
}

/// Where the preset table is in its one-time load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
}

#[derive(Debug)]
struct PresetTable {
    load: LoadState,
    profiles: [ProfilePresets; MAX_PROFILES],
}

/// Pan/tilt control and preset management for up to four profiles.
///
/// Presets are loaded from the store on first use. The table is guarded by
/// one mutex, so a reader never sees a half-applied change, and every
/// mutation is persisted before the lock is released.
pub struct PtzService {
    adapter: Arc<dyn PtzAdapter>,
    store: Arc<dyn PresetStore>,
    table: Mutex<PresetTable>,
    loaded: Condvar,
}

impl PtzService {
    pub fn new(adapter: Arc<dyn PtzAdapter>, store: Arc<dyn PresetStore>) -> Self {
        Self {
            adapter,
            store,
            table: Mutex::new(PresetTable {
                load: LoadState::Uninitialized,
                profiles: Default::default(),
            }),
            loaded: Condvar::new(),
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.table.lock().load
    }

    pub fn get_status(&self, profile: &str) -> Result<PtzStatus> {
        profile_index(profile)?;
        let status = self.adapter.get_status()?;
        let moving = |speed: f32| {
            if speed != 0.0 {
                MoveStatus::Moving
            } else {
                MoveStatus::Idle
            }
        };
        Ok(PtzStatus {
            position: PanTilt {
                x: status.pan_deg / PAN_RANGE_DEG,
                y: status.tilt_deg / TILT_RANGE_DEG,
            },
            pan: moving(status.pan_speed),
            tilt: moving(status.tilt_speed),
        })
    }

    pub fn absolute_move(&self, profile: &str, position: PanTilt, speed: Option<f32>) -> Result<()> {
        profile_index(profile)?;
        let (pan, tilt) = to_degrees(position)?;
        let speed = move_speed(speed)?;
        tracing::debug!(profile, pan, tilt, speed, "Absolute move");
        self.adapter.absolute_move(pan, tilt, speed)
    }

    pub fn relative_move(&self, profile: &str, translation: PanTilt, speed: Option<f32>) -> Result<()> {
        profile_index(profile)?;
        let (pan, tilt) = to_degrees(translation)?;
        let speed = move_speed(speed)?;
        tracing::debug!(profile, pan, tilt, speed, "Relative move");
        self.adapter.relative_move(pan, tilt, speed)
    }

    pub fn continuous_move(&self, profile: &str, velocity: PanTilt, timeout_ms: i64) -> Result<()> {
        profile_index(profile)?;
        let pan_speed = velocity_to_device(check_unit(velocity.x, "pan velocity")?);
        let tilt_speed = velocity_to_device(check_unit(velocity.y, "tilt velocity")?);
        let timeout_s = timeout_seconds(timeout_ms);
        tracing::debug!(profile, pan_speed, tilt_speed, timeout_s, "Continuous move");
        self.adapter.continuous_move(pan_speed, tilt_speed, timeout_s)
    }

    /// Zoom has no hardware behind it, so only the pan/tilt flag matters.
    pub fn stop(&self, profile: &str, pan_tilt: bool, _zoom: bool) -> Result<()> {
        profile_index(profile)?;
        if pan_tilt {
            self.adapter.stop()?;
        }
        Ok(())
    }

    pub fn goto_home(&self, profile: &str, speed: Option<f32>) -> Result<()> {
        self.absolute_move(profile, PanTilt::HOME, speed)
    }

    /// Home is fixed at the center; accepted and ignored.
    pub fn set_home(&self, profile: &str) -> Result<()> {
        profile_index(profile)?;
        tracing::info!(profile, "Home position is fixed; SetHomePosition ignored");
        Ok(())
    }

    pub fn get_presets(&self, profile: &str) -> Result<Vec<Preset>> {
        let index = profile_index(profile)?;
        let table = self.ensure_loaded()?;
        Ok(table.profiles[index].to_vec())
    }

    /// Stores the current position as a preset and returns its token.
    ///
    /// An existing `token` is updated in place; an unknown one creates a new
    /// preset under that token; no token creates `<profile>_Preset<n>`.
    pub fn set_preset(&self, profile: &str, name: Option<&str>, token: Option<&str>) -> Result<String> {
        let index = profile_index(profile)?;
        if let Some(name) = name {
            check_label(name, "preset name")?;
        }
        if let Some(token) = token {
            check_label(token, "preset token")?;
        }

        let position = match self.get_status(profile) {
            Ok(status) => status.position,
            Err(e) => {
                tracing::warn!(profile, error = %e, "PTZ status unavailable, storing neutral position");
                PanTilt::HOME
            }
        };

        let mut table = self.ensure_loaded()?;
        let presets = &mut table.profiles[index];

        let existing = token.and_then(|t| presets.position(t));
        let (assigned, slot, previous) = match existing {
            Some(slot) => {
                let Some(entry) = presets.slot_mut(slot) else {
                    return Err(Error::Internal("preset slot out of range".to_string()));
                };
                let previous = entry.clone();
                if let Some(name) = name {
                    entry.name = name.to_string();
                }
                entry.pan = position.x;
                entry.tilt = position.y;
                (entry.token.clone(), slot, Some(previous))
            }
            None => {
                if presets.is_full() {
                    return Err(Error::ResourceExhausted(format!(
                        "profile {} already holds the maximum number of presets",
                        profile
                    )));
                }
                let token = match token {
                    Some(t) => t.to_string(),
                    None => generate_token(profile, presets),
                };
                let slot = presets.push(Preset {
                    token: token.clone(),
                    name: name.unwrap_or(&token).to_string(),
                    pan: position.x,
                    tilt: position.y,
                })?;
                (token, slot, None)
            }
        };

        if let Err(e) = self.store.save(index, &presets.to_vec()) {
            match previous {
                Some(previous) => {
                    if let Some(entry) = presets.slot_mut(slot) {
                        *entry = previous;
                    }
                }
                None => {
                    presets.remove(slot);
                }
            }
            tracing::error!(profile, error = %e, "Persisting preset failed, change rolled back");
            return Err(e);
        }

        let stored_name = presets
            .get(&assigned)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        drop(table);

        if let Err(e) = self.adapter.set_preset_hint(&stored_name, slot) {
            tracing::warn!(profile, error = %e, "PTZ driver rejected preset hint");
        }
        tracing::info!(profile, token = %assigned, "Preset stored");
        Ok(assigned)
    }

    pub fn goto_preset(&self, profile: &str, token: &str, speed: Option<f32>) -> Result<()> {
        let index = profile_index(profile)?;
        let target = {
            let table = self.ensure_loaded()?;
            table.profiles[index]
                .get(token)
                .map(|p| PanTilt::new(p.pan, p.tilt))
                .ok_or_else(|| Error::NotFound(format!("preset '{}' not found", token)))?
        };
        self.absolute_move(profile, target, speed)
    }

    pub fn remove_preset(&self, profile: &str, token: &str) -> Result<()> {
        let index = profile_index(profile)?;
        let mut table = self.ensure_loaded()?;
        let presets = &mut table.profiles[index];

        let slot = presets
            .position(token)
            .ok_or_else(|| Error::NotFound(format!("preset '{}' not found", token)))?;
        let removed = presets
            .remove(slot)
            .ok_or_else(|| Error::Internal("preset slot out of range".to_string()))?;

        if let Err(e) = self.store.save(index, &presets.to_vec()) {
            presets.insert(slot, removed)?;
            tracing::error!(profile, error = %e, "Persisting preset removal failed, rolled back");
            return Err(e);
        }

        tracing::info!(profile, token, "Preset removed");
        Ok(())
    }

    /// Locks the table, loading it from the store on first use.
    ///
    /// Concurrent first callers wait for the one doing the load. A failed
    /// load leaves the table uninitialised so the next call retries.
    fn ensure_loaded(&self) -> Result<MutexGuard<'_, PresetTable>> {
        let mut table = self.table.lock();
        loop {
            match table.load {
                LoadState::Ready => return Ok(table),
                LoadState::Loading => self.loaded.wait(&mut table),
                LoadState::Uninitialized => {
                    table.load = LoadState::Loading;
                    let result = MutexGuard::unlocked(&mut table, || self.load_all());
                    match result {
                        Ok(profiles) => {
                            table.profiles = profiles;
                            table.load = LoadState::Ready;
                            self.loaded.notify_all();
                        }
                        Err(e) => {
                            table.load = LoadState::Uninitialized;
                            self.loaded.notify_all();
                            tracing::error!(error = %e, "Loading presets failed");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn load_all(&self) -> Result<[ProfilePresets; MAX_PROFILES]> {
        let mut profiles: [ProfilePresets; MAX_PROFILES] = Default::default();
        for (index, slot) in profiles.iter_mut().enumerate() {
            if let Some(stored) = self.store.load(index)? {
                *slot = ProfilePresets::from_presets(stored);
            }
        }
        let total: usize = profiles.iter().map(ProfilePresets::len).sum();
        tracing::info!(presets = total, "PTZ presets loaded");
        Ok(profiles)
    }
}

fn generate_token(profile: &str, presets: &ProfilePresets) -> String {
    let mut n = presets.len() + 1;
    loop {
        let token = format!("{}_Preset{}", profile, n);
        if presets.position(&token).is_none() {
            return token;
        }
        n += 1;
    }
}
