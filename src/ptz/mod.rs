//! PTZ (pan/tilt/zoom) service.
//!
//! ```text
//! SOAP request ─► handlers ─► PtzService ─► PtzAdapter (degrees, device speed)
//!                                  │
//!                                  └──► PresetStore (per-profile preset lists)
//! ```

pub mod adapter;
pub mod handlers;
pub mod presets;
pub mod service;

pub use adapter::{AdapterCommand, COMMAND_LOG_LEN, DeviceStatus, PtzAdapter, SimulatedPtz};
pub use presets::{MemoryPresetStore, Preset, PresetStore, ProfilePresets, YamlPresetStore};
pub use service::{LoadState, MoveStatus, PanTilt, PtzService, PtzStatus};
