use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::metric::{Metric, MetricDef, MetricFormat, StepResult};
use crate::ConfigError;

/// Currency symbol used when a dashboard does not configure one.
pub const DEFAULT_CURRENCY_SYMBOL: &str = "€";

/// Owns a session's metrics in definition order.
#[derive(Clone, Debug)]
pub struct MetricStore {
    metrics: Vec<Metric>,
    index: BTreeMap<String, usize>,
    currency_symbol: String,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            metrics: Vec::new(),
            index: BTreeMap::new(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }

    /// Build a store from definitions, skipping invalid ones with a warning.
    pub fn from_defs(defs: impl IntoIterator<Item = MetricDef>) -> Self {
        let mut store = Self::new();
        for def in defs {
            let key = def.key.clone();
            if let Err(error) = store.insert(def) {
                warn!(metric = %key, %error, "skipping invalid metric definition");
            }
        }
        store
    }

    pub fn with_currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = symbol.into();
        self
    }

    pub fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }

    /// Register a metric. Invalid or duplicate definitions are rejected.
    pub fn insert(&mut self, def: MetricDef) -> Result<(), ConfigError> {
        if self.index.contains_key(&def.key) {
            return Err(ConfigError::DuplicateKey(def.key));
        }
        let metric = Metric::from_def(def)?;
        self.index
            .insert(metric.key().to_string(), self.metrics.len());
        self.metrics.push(metric);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Metric> {
        self.index.get(key).map(|&i| &self.metrics[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    /// Mutable access in definition order. `Metric` only exposes clamping
    /// mutators, so bounds still hold.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Metric> {
        self.metrics.iter_mut()
    }

    /// Set a metric, clamped to its bounds. Unknown keys are a logged no-op.
    pub fn set(&mut self, key: &str, value: f64) -> Result<f64, ConfigError> {
        let metric = self.lookup_mut(key, "set")?;
        metric.set(value).map_err(|error| {
            warn!(metric = %key, %error, "ignoring metric update");
            error
        })
    }

    /// Move a metric by `delta`, clamped. Unknown keys are a logged no-op.
    pub fn apply_delta(&mut self, key: &str, delta: f64) -> Result<StepResult, ConfigError> {
        let metric = self.lookup_mut(key, "apply_delta")?;
        metric.apply_delta(delta).map_err(|error| {
            warn!(metric = %key, %error, "ignoring metric delta");
            error
        })
    }

    /// Restore one metric to its baseline.
    pub fn reset(&mut self, key: &str) -> Result<f64, ConfigError> {
        Ok(self.lookup_mut(key, "reset")?.reset())
    }

    /// Restore every metric to its baseline.
    pub fn reset_all(&mut self) {
        for m in &mut self.metrics {
            m.reset();
        }
    }

    /// Rendered display string for one metric.
    pub fn render(&self, key: &str) -> Option<String> {
        self.get(key).map(|m| m.render(&self.currency_symbol))
    }

    /// Immutable copy for rendering.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings: self
                .metrics
                .iter()
                .map(|m| MetricReading {
                    key: m.key().to_string(),
                    label: m.label().to_string(),
                    value: m.value(),
                    min: m.min(),
                    max: m.max(),
                    format: m.format(),
                    display: m.render(&self.currency_symbol),
                })
                .collect(),
        }
    }

    fn lookup_mut(&mut self, key: &str, op: &'static str) -> Result<&mut Metric, ConfigError> {
        match self.index.get(key) {
            Some(&i) => Ok(&mut self.metrics[i]),
            None => {
                warn!(metric = %key, op, "unknown metric key");
                Err(ConfigError::UnknownMetric(key.to_string()))
            }
        }
    }
}

/// One metric as seen by the render path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricReading {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub format: MetricFormat,
    /// Pre-rendered display string.
    pub display: String,
}

/// Point-in-time copy of a store, in definition order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricsSnapshot {
    readings: Vec<MetricReading>,
}

impl MetricsSnapshot {
    pub fn get(&self, key: &str) -> Option<&MetricReading> {
        self.readings.iter().find(|r| r.key == key)
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.get(key).map(|r| r.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricReading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
