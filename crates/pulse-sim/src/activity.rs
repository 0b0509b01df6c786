use pulse_core::{ActivityEvent, Emphasis, EventId, MetricStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::random::RandomSource;

fn default_weight() -> u32 {
    1
}

/// A feed message pattern.
///
/// `{metric_key}` is replaced by the metric's rendered value and
/// `{pick:a|b|c}` by one of the alternatives. Anything else in braces is
/// left as written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub text: String,
    #[serde(default)]
    pub emphasis: Emphasis,
    /// Relative selection weight; 0 disables the template.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl MessageTemplate {
    pub fn new(text: impl Into<String>, emphasis: Emphasis) -> Self {
        Self {
            text: text.into(),
            emphasis,
            weight: default_weight(),
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// Produces synthetic activity events from a fixed template set.
#[derive(Clone, Debug)]
pub struct ActivityGenerator {
    templates: Vec<MessageTemplate>,
    total_weight: u64,
    probability: f64,
    next_id: u64,
}

impl ActivityGenerator {
    /// `probability` is the per-tick chance of emitting an event; values
    /// outside `[0, 1]` are clamped with a warning.
    pub fn new(templates: Vec<MessageTemplate>, probability: f64) -> Self {
        let probability = if probability.is_finite() && (0.0..=1.0).contains(&probability) {
            probability
        } else {
            warn!(probability, "activity probability outside [0,1], clamping");
            if probability.is_nan() {
                0.0
            } else {
                probability.clamp(0.0, 1.0)
            }
        };
        let total_weight = templates.iter().map(|t| u64::from(t.weight)).sum();
        Self {
            templates,
            total_weight,
            probability,
            next_id: 1,
        }
    }

    pub fn templates(&self) -> &[MessageTemplate] {
        &self.templates
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Emit an event with the configured per-tick probability.
    pub fn maybe_generate(
        &mut self,
        rng: &mut dyn RandomSource,
        store: &MetricStore,
    ) -> Option<ActivityEvent> {
        if !rng.chance(self.probability) {
            return None;
        }
        self.generate(rng, store)
    }

    /// Pick a template and fill it. `None` when no template is selectable.
    pub fn generate(
        &mut self,
        rng: &mut dyn RandomSource,
        store: &MetricStore,
    ) -> Option<ActivityEvent> {
        let template = self.choose(rng)?;
        let message = fill_template(&template.text, store, rng);
        let emphasis = template.emphasis;
        let id = EventId(self.next_id);
        self.next_id += 1;
        Some(ActivityEvent::new(id, message, emphasis))
    }

    fn choose(&self, rng: &mut dyn RandomSource) -> Option<MessageTemplate> {
        if self.total_weight == 0 {
            return None;
        }
        let target =
            ((rng.next_unit() * self.total_weight as f64) as u64).min(self.total_weight - 1);
        let mut acc = 0u64;
        for t in &self.templates {
            acc += u64::from(t.weight);
            if target < acc {
                return Some(t.clone());
            }
        }
        None
    }
}

/// Substitute placeholders in `text` using current metric values.
pub fn fill_template(text: &str, store: &MetricStore, rng: &mut dyn RandomSource) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let token = &after[..close];
        match resolve(token, store, rng) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve(token: &str, store: &MetricStore, rng: &mut dyn RandomSource) -> Option<String> {
    if let Some(choices) = token.strip_prefix("pick:") {
        let options: Vec<&str> = choices.split('|').collect();
        return Some(options[rng.pick_index(options.len())].trim().to_string());
    }
    store.render(token.trim())
}
