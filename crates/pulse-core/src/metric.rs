use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How a metric value is presented on a dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFormat {
    /// Money with two decimals and a currency symbol, e.g. "€2,800,000.00".
    Currency,
    /// Whole counts with thousands grouping, e.g. "1,234".
    #[default]
    Integer,
    /// Rates with one decimal, e.g. "12.3%".
    Percent,
}

impl MetricFormat {
    /// Render `value` for display.
    pub fn render(self, value: f64, currency_symbol: &str) -> String {
        match self {
            MetricFormat::Currency => format!("{currency_symbol}{}", group_thousands(value, 2)),
            MetricFormat::Integer => group_thousands(value, 0),
            MetricFormat::Percent => format!("{value:.1}%"),
        }
    }

    /// Integer metrics only ever hold whole numbers.
    pub fn is_integral(self) -> bool {
        matches!(self, MetricFormat::Integer)
    }
}

fn group_thousands(value: f64, dp: u32) -> String {
    let Some(dec) = Decimal::from_f64(value) else {
        return format!("{:.*}", dp as usize, value);
    };
    let mut rounded = dec.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    let text = rounded.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

fn default_step() -> (f64, f64) {
    (0.0, 1.0)
}

fn default_change_probability() -> f64 {
    1.0
}

/// Declarative metric definition, as written in dashboard presets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricDef {
    /// Stable lookup key, also used as a `{key}` template placeholder.
    pub key: String,
    /// Human-readable label; defaults to the key.
    #[serde(default)]
    pub label: Option<String>,
    /// Baseline value restored on reset.
    pub initial: f64,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Range the per-tick delta is drawn from.
    #[serde(default = "default_step")]
    pub step: (f64, f64),
    /// Chance in [0,1] that the metric moves on a given tick.
    #[serde(default = "default_change_probability")]
    pub change_probability: f64,
    #[serde(default)]
    pub format: MetricFormat,
}

impl MetricDef {
    pub fn new(key: impl Into<String>, initial: f64, min: f64, max: f64) -> Self {
        Self {
            key: key.into(),
            label: None,
            initial,
            min,
            max,
            step: default_step(),
            change_probability: default_change_probability(),
            format: MetricFormat::default(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn step(mut self, lo: f64, hi: f64) -> Self {
        self.step = (lo, hi);
        self
    }

    pub fn change_probability(mut self, probability: f64) -> Self {
        self.change_probability = probability;
        self
    }

    pub fn format(mut self, format: MetricFormat) -> Self {
        self.format = format;
        self
    }
}

/// Validate a metric definition.
pub fn validate_metric_def(def: &MetricDef) -> Result<(), ConfigError> {
    if def.key.trim().is_empty() {
        return Err(ConfigError::EmptyKey);
    }
    let numbers = [
        def.initial,
        def.min,
        def.max,
        def.step.0,
        def.step.1,
        def.change_probability,
    ];
    if numbers.iter().any(|n| !n.is_finite()) {
        return Err(ConfigError::NonFinite(def.key.clone()));
    }
    if def.min > def.max {
        return Err(ConfigError::InvalidBounds {
            key: def.key.clone(),
            min: def.min,
            max: def.max,
        });
    }
    if def.format.is_integral() && (def.min.fract() != 0.0 || def.max.fract() != 0.0) {
        return Err(ConfigError::FractionalBounds {
            key: def.key.clone(),
            min: def.min,
            max: def.max,
        });
    }
    if def.step.0 > def.step.1 {
        return Err(ConfigError::InvalidStepRange {
            key: def.key.clone(),
            lo: def.step.0,
            hi: def.step.1,
        });
    }
    if !(0.0..=1.0).contains(&def.change_probability) {
        return Err(ConfigError::InvalidProbability {
            key: def.key.clone(),
            probability: def.change_probability,
        });
    }
    Ok(())
}

/// Outcome of moving a metric by a delta.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepResult {
    /// Stored value after the step.
    pub value: f64,
    /// Whether the bounds cut the step short.
    pub clamped: bool,
}

/// A bounded KPI. Fields are private so `min <= value <= max` cannot be broken.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    key: String,
    label: String,
    value: f64,
    initial: f64,
    min: f64,
    max: f64,
    step_range: (f64, f64),
    change_probability: f64,
    format: MetricFormat,
}

impl Metric {
    /// Build a metric from a validated definition. The baseline is clamped
    /// into bounds (and rounded for integer metrics).
    pub fn from_def(def: MetricDef) -> Result<Self, ConfigError> {
        validate_metric_def(&def)?;
        let initial = normalize(def.initial, def.format, def.min, def.max);
        Ok(Self {
            label: def.label.unwrap_or_else(|| def.key.clone()),
            key: def.key,
            value: initial,
            initial,
            min: def.min,
            max: def.max,
            step_range: def.step,
            change_probability: def.change_probability,
            format: def.format,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn step_range(&self) -> (f64, f64) {
        self.step_range
    }

    pub fn change_probability(&self) -> f64 {
        self.change_probability
    }

    pub fn format(&self) -> MetricFormat {
        self.format
    }

    /// Store `value` clamped to bounds. Non-finite input is rejected.
    pub fn set(&mut self, value: f64) -> Result<f64, ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::NonFinite(self.key.clone()));
        }
        self.value = normalize(value, self.format, self.min, self.max);
        Ok(self.value)
    }

    /// Move by `delta`, clamping at the bounds. Integer metrics round the delta.
    pub fn apply_delta(&mut self, delta: f64) -> Result<StepResult, ConfigError> {
        if !delta.is_finite() {
            return Err(ConfigError::NonFinite(self.key.clone()));
        }
        let delta = if self.format.is_integral() {
            delta.round()
        } else {
            delta
        };
        let target = self.value + delta;
        self.value = normalize(target, self.format, self.min, self.max);
        Ok(StepResult {
            value: self.value,
            clamped: self.value != target,
        })
    }

    /// Restore the baseline value.
    pub fn reset(&mut self) -> f64 {
        self.value = self.initial;
        self.value
    }

    pub fn render(&self, currency_symbol: &str) -> String {
        self.format.render(self.value, currency_symbol)
    }
}

fn normalize(value: f64, format: MetricFormat, min: f64, max: f64) -> f64 {
    let value = if format.is_integral() {
        value.round()
    } else {
        value
    };
    value.clamp(min, max)
}
