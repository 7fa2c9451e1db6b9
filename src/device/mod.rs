//! Hardware capability driven by the control loop.

pub mod nvml;

use thiserror::Error;

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Couldn't load {0}")]
    Load(String),

    #[error("Missing symbol {0}")]
    Symbol(String),

    #[error("{operation}: {message}")]
    Nvml {
        operation: &'static str,
        message: String,
    },

    #[error("No devices found")]
    NoDevices,

    #[error("Device has no fans")]
    NoFans,
}

/// Device exposing a temperature sensor and controllable fans.
///
/// Calls are synchronous and may be made from any thread.
pub trait FanDevice: Send + Sync {
    /// Current temperature in degrees Celsius.
    fn temperature(&self) -> DeviceResult<u32>;

    fn fan_count(&self) -> DeviceResult<u32>;

    /// Sets fan `fan` to `percent` of its maximum speed.
    fn set_fan_speed(&self, fan: u32, percent: u32) -> DeviceResult<()>;

    /// Hands fan `fan` back to the device's own policy.
    fn set_default_fan_speed(&self, fan: u32) -> DeviceResult<()>;
}
