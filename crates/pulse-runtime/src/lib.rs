#![deny(warnings)]

//! Session lifecycle and polling for live dashboards.
//!
//! A [`Session`] owns one dashboard's metrics, activity log, driver and
//! random source, and executes ticks atomically. The [`PollScheduler`] drives
//! a session on a fixed interval on the tokio runtime and stops it
//! synchronously: once [`PollScheduler::stop`] returns, the session is not
//! touched again.

mod scheduler;
mod session;

pub use scheduler::{PollScheduler, SessionHandle, MIN_TICK_INTERVAL};
pub use session::{Session, SessionSnapshot, SessionStatus, TickContext, TickHook, TickOutcome};

use std::time::Duration;

use pulse_sim::DriverError;
use thiserror::Error;

/// A single tick went wrong. The schedule keeps running.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("driver {driver} failed: {source}")]
    Driver {
        driver: String,
        #[source]
        source: DriverError,
    },
    #[error("tick hook {hook} failed: {message}")]
    Hook { hook: String, message: String },
    #[error("tick panicked: {0}")]
    Panicked(String),
}

/// Lifecycle misuse of a scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start` called while the session is not stopped.
    #[error("session is already {0:?}")]
    AlreadyActive(SessionStatus),
    /// `start` called outside a tokio runtime.
    #[error("no tokio runtime available to drive the session")]
    NoRuntime,
    /// Requested interval is below [`MIN_TICK_INTERVAL`].
    #[error("tick interval {0:?} is below the 10ms minimum")]
    IntervalTooShort(Duration),
}
