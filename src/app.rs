//! Application wiring: parameters in, fan control loop until a stop signal.

use crate::config::{ConfigError, Mode, Parameters};
use crate::control::{CurveControl, FanReset};
use crate::curve::{Curve, CurveError};
use crate::device::nvml::Nvml;
use crate::device::{DeviceError, FanDevice};
use crate::execution::{
    self, ExecutionError, Sender, defer, just_from, repeat_effect, stop_when, sync_wait, then,
};
use crate::pidfile::{DEFAULT_PID_FILE, PidFile, PidFileError};
use crate::runtime::{Scheduler, SingleThreadContext, schedule, schedule_after};
use crate::signal::{self, InlineSignalScheduler, SignalError};
use crate::time::InlineDelayScheduler;

use std::convert::Infallible;
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use libc::c_int;
use thiserror::Error;
use tracing::info;

/// Signals ending the control loop.
pub const STOP_SIGNALS: [c_int; 2] = [libc::SIGINT, libc::SIGTERM];

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    PidFile(#[from] PidFileError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Runtime(#[from] ExecutionError),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Failure of the control loop that none of the other variants describes.
    #[error("{0}")]
    Execution(execution::Error),
}

impl AppError {
    /// Recovers the concrete error of a failed control loop.
    pub fn from_loop(error: execution::Error) -> Self {
        let error = match error.downcast::<DeviceError>() {
            Ok(error) => return AppError::Device(*error),
            Err(error) => error,
        };

        match error.downcast::<ExecutionError>() {
            Ok(error) => AppError::Runtime(*error),
            Err(error) => AppError::Execution(error),
        }
    }
}

/// Time to wait before the next iteration so iterations start on interval boundaries.
///
/// An iteration that overran skips the boundaries it missed.
pub fn next_delay(elapsed: Duration, interval: Duration) -> Duration {
    if interval.is_zero() {
        return Duration::ZERO;
    }

    if elapsed > interval {
        let overshoot = elapsed.as_nanos() % interval.as_nanos();
        interval - Duration::from_nanos(overshoot as u64)
    } else {
        interval - elapsed
    }
}

/// Runs `control` every `interval` on `work_scheduler` until `stop_condition` completes.
///
/// Each iteration records its start time, moves onto the work scheduler, applies the curve and
/// then waits inline for the rest of the interval. The wait observes the stop request raised
/// when `stop_condition` completes.
///
/// # Returns
/// Ok once stopped, or the first failure of either side
pub fn run_loop<D, W, C>(
    control: &CurveControl<'_, D>,
    interval: Duration,
    work_scheduler: &W,
    stop_condition: C,
) -> Result<(), execution::Error>
where
    D: FanDevice + ?Sized,
    W: Scheduler,
    W::Sender: Clone,
    C: Sender,
{
    let started = Mutex::new(Instant::now());
    let started = &started;

    let iteration = then(
        just_from(move || {
            *started.lock().unwrap() = Instant::now();
            Ok::<_, Infallible>(())
        }),
        then(
            schedule(work_scheduler),
            then(
                just_from(move || control.apply()),
                defer(move || {
                    let elapsed = started.lock().unwrap().elapsed();
                    schedule_after(&InlineDelayScheduler, next_delay(elapsed, interval))
                }),
            ),
        ),
    );

    sync_wait(stop_when(repeat_effect(iteration), stop_condition))
}

/// Drives `control` until one of `signals` arrives.
///
/// The loop runs on a dedicated work thread; a second thread waits for the signals.
pub fn run_until_signalled<D: FanDevice + ?Sized>(
    control: &CurveControl<'_, D>,
    interval: Duration,
    signals: &[c_int],
) -> AppResult<()> {
    let signal_scheduler = InlineSignalScheduler::new(signals)?;

    let mut work_context = SingleThreadContext::builder().name("fanctl-work").build();
    let mut signal_context = SingleThreadContext::builder().name("fanctl-signal").build();
    work_context.run()?;
    signal_context.run()?;

    let stop_condition = then(
        schedule(&signal_context.scheduler()),
        then(
            schedule(&signal_scheduler),
            just_from(|| {
                info!("Signal received. Stopping...");
                Ok::<_, Infallible>(())
            }),
        ),
    );

    info!("Running");
    let result = run_loop(control, interval, &work_context.scheduler(), stop_condition);

    signal_context.stop();
    work_context.stop();

    result.map_err(AppError::from_loop)?;
    info!("Stopped");

    Ok(())
}

/// Runs the application for already parsed parameters.
pub fn run(params: &Parameters) -> AppResult<()> {
    params.validate()?;
    let curve = Curve::parse(&params.curve, params.max_temperature)?;

    if params.mode() == Mode::PrintFanCurve {
        curve.write_table(&mut io::stdout().lock())?;
        return Ok(());
    }

    let _pid_file = if params.use_pidfile() {
        PidFile::create(DEFAULT_PID_FILE)?
    } else {
        None
    };

    // Before any thread exists, so only the signal wait ever sees these.
    signal::block_signals(&STOP_SIGNALS)?;

    let nvml = Nvml::init()?;

    let device_count = nvml.device_count()?;
    if device_count < 1 {
        return Err(DeviceError::NoDevices.into());
    }
    info!(device_count, "Found GPUs");

    let device = nvml.device(0)?;

    if params.persistence_mode {
        info!("Enabling persistence mode");
        device.set_persistence_mode()?;
    }

    let fan_count = device.fan_count()?;
    if fan_count < 1 {
        return Err(DeviceError::NoFans.into());
    }
    info!(fan_count, "Device fans found");

    let _reset = FanReset::new(&device, fan_count);
    let control = CurveControl::new(&device, &curve, fan_count, params.output_metrics);

    run_until_signalled(&control, params.interval(), &STOP_SIGNALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_fills_the_interval() {
        let interval = Duration::from_secs(5);

        assert_eq!(next_delay(Duration::ZERO, interval), interval);
        assert_eq!(
            next_delay(Duration::from_millis(1200), interval),
            Duration::from_millis(3800)
        );
        assert_eq!(next_delay(interval, interval), Duration::ZERO);
    }

    #[test]
    fn next_delay_skips_missed_boundaries() {
        let interval = Duration::from_secs(5);

        assert_eq!(
            next_delay(Duration::from_millis(7000), interval),
            Duration::from_millis(3000)
        );
        assert_eq!(
            next_delay(Duration::from_millis(10_000), interval),
            interval
        );
    }

    #[test]
    fn loop_failures_keep_their_type() {
        let error: execution::Error = Box::new(DeviceError::NoFans);
        assert!(matches!(
            AppError::from_loop(error),
            AppError::Device(DeviceError::NoFans)
        ));

        let error: execution::Error = Box::new(ExecutionError::Panicked("boom".into()));
        assert!(matches!(
            AppError::from_loop(error),
            AppError::Runtime(ExecutionError::Panicked(_))
        ));

        let error: execution::Error = "other".into();
        assert!(matches!(AppError::from_loop(error), AppError::Execution(_)));
    }
}
