//! Time utilities: inline delays and timeouts built from them.
//!
//! # Example: Sleep
//!
//! ```ignore
//! use fanctl::execution::{just_from, sync_wait, then};
//! use fanctl::time::sleep;
//! use std::time::Duration;
//!
//! sync_wait(then(sleep(Duration::from_secs(1)), just_from(|| Ok::<_, std::io::Error>(()))))?;
//! ```
//!
//! # Example: Timeout
//!
//! A timeout is a race between the work and a delay. Inline work holds the starting thread until
//! it completes, so the work is moved onto a context first and polls its stop token from there.
//!
//! ```ignore
//! use fanctl::execution::{stop_when, sync_wait, then};
//! use fanctl::runtime::{SingleThreadContext, schedule};
//! use fanctl::time::sleep;
//! use std::time::Duration;
//!
//! let mut context = SingleThreadContext::new();
//! context.run()?;
//!
//! let work = then(schedule(&context.scheduler()), sleep(Duration::from_secs(10)));
//! let result = sync_wait(stop_when(work, sleep(Duration::from_millis(100))));
//! assert!(result.is_ok());
//! ```

pub mod delay;

pub use delay::{Delay, DelayOperation, InlineDelayScheduler, TIME_SLICE, sleep};
