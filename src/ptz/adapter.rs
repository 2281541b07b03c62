//! Boundary between the PTZ service and the motor driver.
//!
//! Everything on this side of the trait speaks device units: degrees for
//! position and the driver's 15–100 speed scale (signed for continuous
//! moves). Hardware commands that outlive their timeout are stopped by the
//! adapter itself.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{Error, Result};

pub const PAN_RANGE_DEG: f32 = 180.0;
pub const TILT_RANGE_DEG: f32 = 90.0;

/// Commands [`SimulatedPtz`] remembers; older ones are dropped.
pub const COMMAND_LOG_LEN: usize = 64;

/// Live device position and motion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceStatus {
    pub pan_deg: f32,
    pub tilt_deg: f32,
    /// Signed device speed, zero when the axis is idle
    pub pan_speed: f32,
    pub tilt_speed: f32,
}

pub trait PtzAdapter: Send + Sync {
    fn get_status(&self) -> Result<DeviceStatus>;

    fn absolute_move(&self, pan_deg: f32, tilt_deg: f32, speed: f32) -> Result<()>;

    /// Moves by a delta from the current position.
    fn relative_move(&self, pan_deg: f32, tilt_deg: f32, speed: f32) -> Result<()>;

    /// Runs each axis at a signed speed until stopped or `timeout_s` elapses.
    fn continuous_move(&self, pan_speed: f32, tilt_speed: f32, timeout_s: u32) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Tells the driver a preset was stored in `index` under `name`.
    fn set_preset_hint(&self, name: &str, index: usize) -> Result<()>;
}

/// A command received by [`SimulatedPtz`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCommand {
    Absolute { pan_deg: f32, tilt_deg: f32, speed: f32 },
    Relative { pan_deg: f32, tilt_deg: f32, speed: f32 },
    Continuous { pan_speed: f32, tilt_speed: f32, timeout_s: u32 },
    Stop,
    PresetHint { name: String, index: usize },
}

#[derive(Debug, Default)]
struct SimState {
    status: DeviceStatus,
    commands: VecDeque<AdapterCommand>,
    fail_status: bool,
    fail_moves: bool,
}

/// Motorless stand-in that tracks position and records the most recent
/// commands.
///
/// Moves complete instantly; continuous moves set the axis speeds until
/// `stop`.
#[derive(Debug, Default)]
pub struct SimulatedPtz {
    state: Mutex<SimState>,
}

impl SimulatedPtz {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<AdapterCommand> {
        self.state.lock().commands.iter().cloned().collect()
    }

    pub fn last_command(&self) -> Option<AdapterCommand> {
        self.state.lock().commands.back().cloned()
    }

    /// Makes `get_status` fail, as a disconnected driver would.
    pub fn set_fail_status(&self, fail: bool) {
        self.state.lock().fail_status = fail;
    }

    pub fn set_fail_moves(&self, fail: bool) {
        self.state.lock().fail_moves = fail;
    }

    pub fn set_position(&self, pan_deg: f32, tilt_deg: f32) {
        let mut state = self.state.lock();
        state.status.pan_deg = pan_deg;
        state.status.tilt_deg = tilt_deg;
    }

    fn record(&self, command: AdapterCommand, apply: impl FnOnce(&mut DeviceStatus)) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_moves {
            return Err(Error::Internal("PTZ driver rejected command".to_string()));
        }
        apply(&mut state.status);
        if state.commands.len() == COMMAND_LOG_LEN {
            state.commands.pop_front();
        }
        state.commands.push_back(command);
        Ok(())
    }
}

impl PtzAdapter for SimulatedPtz {
    fn get_status(&self) -> Result<DeviceStatus> {
        let state = self.state.lock();
        if state.fail_status {
            return Err(Error::Internal("PTZ driver status unavailable".to_string()));
        }
        Ok(state.status)
    }

    fn absolute_move(&self, pan_deg: f32, tilt_deg: f32, speed: f32) -> Result<()> {
        self.record(AdapterCommand::Absolute { pan_deg, tilt_deg, speed }, |s| {
            s.pan_deg = pan_deg.clamp(-PAN_RANGE_DEG, PAN_RANGE_DEG);
            s.tilt_deg = tilt_deg.clamp(-TILT_RANGE_DEG, TILT_RANGE_DEG);
        })
    }

    fn relative_move(&self, pan_deg: f32, tilt_deg: f32, speed: f32) -> Result<()> {
        self.record(AdapterCommand::Relative { pan_deg, tilt_deg, speed }, |s| {
            s.pan_deg = (s.pan_deg + pan_deg).clamp(-PAN_RANGE_DEG, PAN_RANGE_DEG);
            s.tilt_deg = (s.tilt_deg + tilt_deg).clamp(-TILT_RANGE_DEG, TILT_RANGE_DEG);
        })
    }

    fn continuous_move(&self, pan_speed: f32, tilt_speed: f32, timeout_s: u32) -> Result<()> {
        self.record(
            AdapterCommand::Continuous { pan_speed, tilt_speed, timeout_s },
            |s| {
                s.pan_speed = pan_speed;
                s.tilt_speed = tilt_speed;
            },
        )
    }

    fn stop(&self) -> Result<()> {
        self.record(AdapterCommand::Stop, |s| {
            s.pan_speed = 0.0;
            s.tilt_speed = 0.0;
        })
    }

    fn set_preset_hint(&self, name: &str, index: usize) -> Result<()> {
        self.record(
            AdapterCommand::PresetHint { name: name.to_string(), index },
            |_| {},
        )
    }
}
