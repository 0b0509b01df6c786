#![deny(warnings)]

//! Simulation primitives that move dashboard metrics between ticks.
//!
//! This crate provides:
//! - An injectable [`RandomSource`] with a seeded ChaCha implementation and a
//!   scripted one for tests
//! - The randomized [`Incrementer`] that nudges metrics within their bounds
//! - [`MetricDriver`], the seam a session uses to mutate metrics, with the
//!   incrementer and a [`DeltaFeed`] for externally supplied updates
//! - The [`ActivityGenerator`] that turns message templates into feed events

mod activity;
mod driver;
mod incrementer;
mod random;

pub use activity::{fill_template, ActivityGenerator, MessageTemplate};
pub use driver::{DeltaFeed, DeltaSender, DriverError, FeedUpdate, MetricDriver};
pub use incrementer::{Incrementer, TickReport};
pub use random::{RandomSource, ScriptedSource, SeededSource};
