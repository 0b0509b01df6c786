#![deny(warnings)]

//! Core data model for live dashboard metrics.
//!
//! This crate defines the bounded metrics a dashboard session displays, the
//! store that owns them, and the capacity-bounded activity log. Every
//! mutation path clamps to the declared bounds, so `min <= value <= max`
//! holds no matter who drives the store.

mod activity;
mod metric;
mod store;

pub use activity::{ActivityEvent, ActivityLog, Emphasis, EventId, DEFAULT_LOG_CAPACITY};
pub use metric::{validate_metric_def, Metric, MetricDef, MetricFormat, StepResult};
pub use store::{MetricReading, MetricStore, MetricsSnapshot, DEFAULT_CURRENCY_SYMBOL};

use thiserror::Error;

/// Configuration problems with metric definitions or metric lookups.
///
/// None of these are fatal to a running session; callers log and carry on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// No metric with this key exists in the store.
    #[error("unknown metric key: {0}")]
    UnknownMetric(String),
    /// A metric with this key is already registered.
    #[error("duplicate metric key: {0}")]
    DuplicateKey(String),
    /// Metric key is empty or whitespace.
    #[error("metric key must not be empty")]
    EmptyKey,
    /// Lower bound exceeds upper bound.
    #[error("metric {key}: min {min} is greater than max {max}")]
    InvalidBounds { key: String, min: f64, max: f64 },
    /// Lower end of the step range exceeds the upper end.
    #[error("metric {key}: step range ({lo}, {hi}) is inverted")]
    InvalidStepRange { key: String, lo: f64, hi: f64 },
    /// Change probability outside [0, 1].
    #[error("metric {key}: change probability {probability} outside [0,1]")]
    InvalidProbability { key: String, probability: f64 },
    /// Integer metric declared with a fractional bound.
    #[error("metric {key}: integer metric needs whole bounds, got [{min}, {max}]")]
    FractionalBounds { key: String, min: f64, max: f64 },
    /// NaN or infinite number where a finite one is required.
    #[error("metric {0}: non-finite numeric value")]
    NonFinite(String),
}
