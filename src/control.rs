//! Curve-driven fan control, one step per loop iteration.

use crate::curve::Curve;
use crate::device::{DeviceResult, FanDevice};

use std::io::{self, Write};
use std::sync::Mutex;

use tracing::{debug, info, warn};

/// Applies a [`Curve`] to every fan of a device.
///
/// The speed is only written when it differs from the one applied by the previous step. A
/// target of 0 hands the fans back to the device's own policy.
pub struct CurveControl<'a, D: FanDevice + ?Sized> {
    device: &'a D,
    curve: &'a Curve,
    fan_count: u32,
    output_metrics: bool,
    previous: Mutex<Option<u32>>,
}

impl<'a, D: FanDevice + ?Sized> CurveControl<'a, D> {
    /// # Arguments
    /// * `device` - Device to read and drive
    /// * `curve` - Temperature to fan speed mapping
    /// * `fan_count` - Number of fans to drive, from `0` to `fan_count - 1`
    /// * `output_metrics` - Print `<temperature> <fan speed>` to stdout on every step
    pub fn new(device: &'a D, curve: &'a Curve, fan_count: u32, output_metrics: bool) -> Self {
        Self {
            device,
            curve,
            fan_count,
            output_metrics,
            previous: Mutex::new(None),
        }
    }

    /// Reads the temperature and applies the matching fan speed.
    pub fn apply(&self) -> DeviceResult<()> {
        let temperature = self.device.temperature()?;
        let target = self.curve.value_at(temperature);

        let mut previous = self.previous.lock().unwrap();
        if *previous != Some(target) {
            debug!(temperature, target, "Updating fan speed");
            self.set_fan_speed(target)?;
            *previous = Some(target);
        } else {
            debug!(temperature, target, "No fan speed change");
        }

        if self.output_metrics {
            let mut stdout = io::stdout().lock();
            if let Err(error) = writeln!(stdout, "{temperature} {target}") {
                warn!(%error, "Couldn't write metrics");
            }
        }

        Ok(())
    }

    fn set_fan_speed(&self, speed: u32) -> DeviceResult<()> {
        for fan in 0..self.fan_count {
            if speed == 0 {
                self.device.set_default_fan_speed(fan)?;
            } else {
                self.device.set_fan_speed(fan, speed)?;
            }
        }

        Ok(())
    }
}

/// Hands every fan back to the device's own policy, logging failures.
pub fn reset_fans<D: FanDevice + ?Sized>(device: &D, fan_count: u32) {
    info!("Resetting fans to default state");

    for fan in 0..fan_count {
        if let Err(error) = device.set_default_fan_speed(fan) {
            warn!(fan, %error, "Couldn't reset fan to default");
        }
    }
}

/// Resets the fans when dropped.
pub struct FanReset<'a, D: FanDevice + ?Sized> {
    device: &'a D,
    fan_count: u32,
}

impl<'a, D: FanDevice + ?Sized> FanReset<'a, D> {
    pub fn new(device: &'a D, fan_count: u32) -> Self {
        Self { device, fan_count }
    }
}

impl<D: FanDevice + ?Sized> Drop for FanReset<'_, D> {
    fn drop(&mut self) {
        reset_fans(self.device, self.fan_count);
    }
}
