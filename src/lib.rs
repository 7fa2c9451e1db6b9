//! GPU fan control driven by a small sender/receiver execution substrate.
//!
//! A control loop reads the GPU temperature, maps it through a fan curve and applies the result,
//! once per interval, until SIGINT or SIGTERM arrives. The loop is a composition of senders:
//! work is described as values, connected to receivers and started, without a heap-allocating
//! task runtime.
//!
//! # Architecture
//!
//! - **execution**: Sender/receiver protocol and its combinators (`then`, `defer`,
//!   `repeat_effect`, `stop_when`, `sync_wait`)
//! - **runtime**: Scheduler traits and the worker-thread `SingleThreadContext`
//! - **ContextBuilder**: Fluent builder for worker-thread contexts
//! - **time**: Inline delay scheduler and `sleep`
//! - **signal**: Inline scheduler completing when a signal arrives
//! - **curve**: Fan curve parsing and interpolation
//! - **device**: Fan device capability and its NVML implementation
//! - **control**: One control step applying the curve to a device
//! - **config**, **logging**, **pidfile**, **app**: The command line application

mod builder;

pub mod app;
pub mod config;
pub mod control;
pub mod curve;
pub mod device;
pub mod execution;
pub mod logging;
pub mod pidfile;
pub mod runtime;
pub mod signal;
pub mod time;

pub use builder::ContextBuilder;
pub use runtime::SingleThreadContext;
pub use time::sleep;
