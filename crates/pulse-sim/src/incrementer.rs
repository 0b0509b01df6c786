use pulse_core::MetricStore;
use tracing::warn;

use crate::random::RandomSource;

/// Counts from one pass over the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Metrics whose value was moved (possibly by zero after clamping).
    pub changed: usize,
    /// Moves cut short by a bound.
    pub clamped: usize,
}

/// Randomized per-tick drift.
///
/// For each metric in definition order: one draw decides whether it moves
/// (`change_probability`), and a second draw picks the delta from its step
/// range. The result is clamped, so repeated ticks at a bound stay there.
#[derive(Clone, Copy, Debug, Default)]
pub struct Incrementer;

impl Incrementer {
    pub fn tick(&self, store: &mut MetricStore, rng: &mut dyn RandomSource) -> TickReport {
        let mut report = TickReport::default();
        for metric in store.iter_mut() {
            if !rng.chance(metric.change_probability()) {
                continue;
            }
            let (lo, hi) = metric.step_range();
            let delta = rng.uniform(lo, hi);
            match metric.apply_delta(delta) {
                Ok(step) => {
                    report.changed += 1;
                    if step.clamped {
                        report.clamped += 1;
                    }
                }
                Err(error) => warn!(metric = metric.key(), %error, "skipping metric step"),
            }
        }
        report
    }
}
