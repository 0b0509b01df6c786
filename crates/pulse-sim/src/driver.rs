use pulse_core::{ConfigError, MetricStore};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::incrementer::{Incrementer, TickReport};
use crate::random::RandomSource;

/// Failure while driving metrics for one tick.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A metric rejected an update.
    #[error("metric update rejected: {0}")]
    Config(#[from] ConfigError),
    /// The driver could not obtain data this tick.
    #[error("metric source unavailable: {0}")]
    Unavailable(String),
}

/// Mutates the metric store once per tick.
///
/// The randomized [`Incrementer`] is the default; [`DeltaFeed`] applies
/// updates pushed by a real backend poller instead.
pub trait MetricDriver: Send {
    fn name(&self) -> &str;

    fn drive(
        &mut self,
        store: &mut MetricStore,
        rng: &mut dyn RandomSource,
    ) -> Result<TickReport, DriverError>;
}

impl MetricDriver for Incrementer {
    fn name(&self) -> &str {
        "incrementer"
    }

    fn drive(
        &mut self,
        store: &mut MetricStore,
        rng: &mut dyn RandomSource,
    ) -> Result<TickReport, DriverError> {
        Ok(self.tick(store, rng))
    }
}

/// An update delivered by an external source.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedUpdate {
    /// Move a metric by a relative amount.
    Delta { key: String, delta: f64 },
    /// Overwrite a metric with an absolute reading.
    Set { key: String, value: f64 },
}

/// Producer half of a [`DeltaFeed`]. Cheap to clone.
#[derive(Clone, Debug)]
pub struct DeltaSender {
    tx: mpsc::UnboundedSender<FeedUpdate>,
}

impl DeltaSender {
    /// Queue an update. Returns `false` once the feed has been dropped.
    pub fn send(&self, update: FeedUpdate) -> bool {
        self.tx.send(update).is_ok()
    }

    pub fn delta(&self, key: impl Into<String>, delta: f64) -> bool {
        self.send(FeedUpdate::Delta {
            key: key.into(),
            delta,
        })
    }

    pub fn set(&self, key: impl Into<String>, value: f64) -> bool {
        self.send(FeedUpdate::Set {
            key: key.into(),
            value,
        })
    }
}

/// Driver that applies queued external updates on each tick.
///
/// Updates for unknown keys are logged and skipped; the rest of the batch
/// still applies.
#[derive(Debug)]
pub struct DeltaFeed {
    rx: mpsc::UnboundedReceiver<FeedUpdate>,
}

impl DeltaFeed {
    pub fn channel() -> (DeltaFeed, DeltaSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DeltaFeed { rx }, DeltaSender { tx })
    }
}

impl MetricDriver for DeltaFeed {
    fn name(&self) -> &str {
        "delta-feed"
    }

    fn drive(
        &mut self,
        store: &mut MetricStore,
        _rng: &mut dyn RandomSource,
    ) -> Result<TickReport, DriverError> {
        let mut report = TickReport::default();
        let mut skipped = 0usize;
        while let Ok(update) = self.rx.try_recv() {
            let outcome = match &update {
                FeedUpdate::Delta { key, delta } => {
                    store.apply_delta(key, *delta).map(|step| step.clamped)
                }
                FeedUpdate::Set { key, value } => {
                    store.set(key, *value).map(|stored| stored != *value)
                }
            };
            match outcome {
                Ok(clamped) => {
                    report.changed += 1;
                    if clamped {
                        report.clamped += 1;
                    }
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "dropped feed updates for unusable metrics");
        }
        debug!(changed = report.changed, "applied feed updates");
        Ok(report)
    }
}
