#![deny(warnings)]

//! Dashboard presets: per-dashboard metric definitions and message templates.
//!
//! A preset is a YAML document injected into the shared session engine, so
//! each dashboard supplies data instead of its own polling code. The bot,
//! fusion and profit dashboards ship as built-ins under `assets/presets`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pulse_core::{
    validate_metric_def, ConfigError, MetricDef, MetricStore, DEFAULT_CURRENCY_SYMBOL,
    DEFAULT_LOG_CAPACITY,
};
use pulse_runtime::{PollScheduler, SchedulerError, Session};
use pulse_sim::{ActivityGenerator, MessageTemplate};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable that overrides a preset's seed.
pub const SEED_ENV: &str = "PULSE_SEED";

const BUILTIN: &[(&str, &str)] = &[
    ("bot", include_str!("../../../assets/presets/bot.yaml")),
    ("fusion", include_str!("../../../assets/presets/fusion.yaml")),
    ("profit", include_str!("../../../assets/presets/profit.yaml")),
];

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to read preset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse preset YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown preset {0:?}; expected a built-in name or a YAML file")]
    UnknownPreset(String),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

fn default_tick_interval_ms() -> u64 {
    2_000
}

fn default_currency_symbol() -> String {
    DEFAULT_CURRENCY_SYMBOL.to_string()
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_activity_probability() -> f64 {
    1.0
}

/// Activity feed settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
    /// Chance per tick that an event is generated.
    #[serde(default = "default_activity_probability")]
    pub probability: f64,
    #[serde(default)]
    pub templates: Vec<MessageTemplate>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
            probability: default_activity_probability(),
            templates: Vec::new(),
        }
    }
}

/// One dashboard's simulation setup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DashboardPreset {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub metrics: Vec<MetricDef>,
}

impl DashboardPreset {
    /// Parse a preset. Metric problems are logged, not fatal; the affected
    /// metrics are left out of the store.
    pub fn parse(yaml: &str) -> Result<Self, PresetError> {
        let preset: Self = serde_yaml::from_str(yaml)?;
        for problem in preset.problems() {
            warn!(preset = %preset.name, %problem, "preset metric will be skipped");
        }
        Ok(preset)
    }

    pub fn from_file(path: &Path) -> Result<Self, PresetError> {
        let text = fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn builtin(name: &str) -> Result<Self, PresetError> {
        let (_, yaml) = BUILTIN
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| PresetError::UnknownPreset(name.to_string()))?;
        Self::parse(yaml)
    }

    /// Invalid or duplicate metric definitions in this preset.
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        let mut problems = Vec::new();
        for def in &self.metrics {
            if let Err(e) = validate_metric_def(def) {
                problems.push(e);
            } else if !seen.insert(def.key.as_str()) {
                problems.push(ConfigError::DuplicateKey(def.key.clone()));
            }
        }
        problems
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn metric_store(&self) -> MetricStore {
        MetricStore::from_defs(self.metrics.iter().cloned())
            .with_currency_symbol(self.currency_symbol.clone())
    }

    /// Seed precedence: explicit override, then `PULSE_SEED`, then the
    /// preset's own seed. Without any, the session draws from entropy.
    pub fn resolve_seed(&self, seed_override: Option<u64>) -> Option<u64> {
        seed_override.or_else(seed_from_env).or(self.seed)
    }

    pub fn build_session(&self, seed_override: Option<u64>) -> Session {
        let generator = ActivityGenerator::new(
            self.activity.templates.clone(),
            self.activity.probability,
        );
        let session = Session::new(self.name.clone(), self.metric_store())
            .with_log_capacity(self.activity.capacity)
            .with_activity(generator);
        match self.resolve_seed(seed_override) {
            Some(seed) => session.with_seed(seed),
            None => session,
        }
    }

    pub fn scheduler(&self, seed_override: Option<u64>) -> Result<PollScheduler, PresetError> {
        let session = self.build_session(seed_override);
        info!(
            preset = %self.name,
            interval_ms = self.tick_interval_ms,
            seed = ?session.seed(),
            "building scheduler"
        );
        Ok(PollScheduler::new(session, self.tick_interval())?)
    }
}

/// Names of the built-in presets.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(name, _)| *name)
}

/// Resolve a built-in preset name first, then a YAML file path.
pub fn load_preset(name_or_path: &str) -> Result<DashboardPreset, PresetError> {
    if builtin_names().any(|n| n == name_or_path) {
        return DashboardPreset::builtin(name_or_path);
    }
    let path = Path::new(name_or_path);
    if path.is_file() {
        return DashboardPreset::from_file(path);
    }
    Err(PresetError::UnknownPreset(name_or_path.to_string()))
}

/// Seed from `PULSE_SEED`, if set to a valid integer.
pub fn seed_from_env() -> Option<u64> {
    let raw = std::env::var(SEED_ENV).ok()?;
    let seed = parse_seed(&raw);
    if seed.is_none() {
        warn!(value = %raw, "ignoring invalid {SEED_ENV}");
    }
    seed
}

fn parse_seed(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pulse_core::{Emphasis, MetricFormat};
    use pulse_runtime::SessionStatus;

    #[test]
    fn builtins_parse_cleanly() {
        for name in builtin_names() {
            let p = DashboardPreset::builtin(name).unwrap();
            assert_eq!(p.name, name);
            assert!(p.problems().is_empty(), "{name}: {:?}", p.problems());
            assert_eq!(p.metric_store().len(), p.metrics.len());
            assert!(!p.activity.templates.is_empty());
            assert!(p.tick_interval() >= pulse_runtime::MIN_TICK_INTERVAL);
        }
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let p = DashboardPreset::parse(
            "name: tiny\nmetrics:\n  - key: hits\n    initial: 1\n    min: 0\n    max: 9\n",
        )
        .unwrap();
        assert_eq!(p.tick_interval_ms, 2_000);
        assert_eq!(p.currency_symbol, "€");
        assert_eq!(p.activity, ActivityConfig::default());
        assert_eq!(p.metrics[0].format, MetricFormat::Integer);
        assert_eq!(p.title(), "tiny");
    }

    #[test]
    fn invalid_metrics_reported_and_skipped() {
        let p = DashboardPreset::parse(
            r#"
name: broken
metrics:
  - { key: ok, initial: 1, min: 0, max: 5 }
  - { key: inverted, initial: 1, min: 9, max: 5 }
  - { key: ok, initial: 2, min: 0, max: 5 }
"#,
        )
        .unwrap();
        let problems = p.problems();
        assert_eq!(problems.len(), 2);
        assert!(matches!(problems[0], ConfigError::InvalidBounds { .. }));
        assert_eq!(problems[1], ConfigError::DuplicateKey("ok".into()));
        let store = p.metric_store();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("ok").unwrap().value(), 1.0);
    }

    #[test]
    fn integer_metric_with_fractional_bounds_skipped() {
        let p = DashboardPreset::parse(
            "name: agents\nmetrics:\n  - { key: agents, initial: 2, min: 0.5, max: 10 }\n",
        )
        .unwrap();
        assert!(matches!(
            p.problems().as_slice(),
            [ConfigError::FractionalBounds { .. }]
        ));
        assert!(p.metric_store().is_empty());
    }

    #[test]
    fn templates_deserialize() {
        let p = DashboardPreset::builtin("bot").unwrap();
        let t = &p.activity.templates[0];
        assert_eq!(t.emphasis, Emphasis::Success);
        assert_eq!(t.weight, 3);
        assert_eq!(p.activity.templates[2].weight, 1);
    }

    #[test]
    fn unknown_preset_rejected() {
        assert!(matches!(
            load_preset("no-such-dashboard"),
            Err(PresetError::UnknownPreset(_))
        ));
        assert!(matches!(load_preset("fusion"), Ok(p) if p.name == "fusion"));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("pulse-preset-{}.yaml", std::process::id()));
        fs::write(
            &path,
            r#"
name: file
currency_symbol: "$"
metrics:
  - { key: mrr, initial: 10, min: 0, max: 100, format: currency }
"#,
        )
        .unwrap();
        let p = load_preset(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(p.metric_store().render("mrr").unwrap(), "$10.00");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = DashboardPreset::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, PresetError::Io { .. }));
    }

    #[test]
    fn explicit_seed_wins() {
        let p = DashboardPreset::builtin("profit").unwrap();
        assert_eq!(p.resolve_seed(Some(7)), Some(7));
    }

    #[test]
    fn seed_parsing() {
        assert_eq!(parse_seed(" 42 "), Some(42));
        assert_eq!(parse_seed("abc"), None);
        assert_eq!(parse_seed("-1"), None);
    }

    #[test]
    fn preset_session_runs_stepped() {
        let p = DashboardPreset::builtin("profit").unwrap();
        let mut scheduler = p.scheduler(Some(99)).unwrap();
        scheduler.start_stepped().unwrap();
        for _ in 0..50 {
            scheduler.tick_now();
        }
        let snap = scheduler.snapshot();
        assert_eq!(snap.status, SessionStatus::Running);
        assert_eq!(snap.tick_count, 50);
        assert!(snap.events.len() <= p.activity.capacity);
        for reading in snap.metrics.iter() {
            assert!(reading.min <= reading.value && reading.value <= reading.max);
        }
    }

    #[test]
    fn too_fast_interval_rejected_when_scheduling() {
        let p = DashboardPreset::parse("name: fast\ntick_interval_ms: 1\n").unwrap();
        assert!(matches!(
            p.scheduler(Some(1)),
            Err(PresetError::Scheduler(SchedulerError::IntervalTooShort(_)))
        ));
    }

    proptest! {
        #[test]
        fn any_builtin_any_seed_stays_in_bounds(seed in any::<u64>(), idx in 0usize..3) {
            let name = builtin_names().nth(idx).unwrap();
            let p = DashboardPreset::builtin(name).unwrap();
            let mut scheduler = p.scheduler(Some(seed)).unwrap();
            scheduler.start_stepped().unwrap();
            for _ in 0..100 {
                scheduler.tick_now();
            }
            for reading in scheduler.snapshot().metrics.iter() {
                prop_assert!(reading.min <= reading.value && reading.value <= reading.max);
            }
        }
    }
}
