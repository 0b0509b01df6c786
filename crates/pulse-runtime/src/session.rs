use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use pulse_core::{ActivityEvent, ActivityLog, EventId, MetricStore, MetricsSnapshot};
use pulse_sim::{
    ActivityGenerator, Incrementer, MetricDriver, RandomSource, SeededSource, TickReport,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{SchedulerError, TickError};

/// Lifecycle of a session: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Read-only view handed to tick hooks.
#[derive(Clone, Copy, Debug)]
pub struct TickContext<'a> {
    pub session: &'a str,
    pub tick: u64,
    pub store: &'a MetricStore,
    pub log: &'a ActivityLog,
}

/// Observer invoked at the end of every tick.
///
/// An error (or panic) is logged and counted as a failed tick; the schedule
/// continues.
///
/// Hooks run while the scheduler holds the session lock, which is not
/// reentrant. Read state only through the [`TickContext`]; calling back into
/// a `SessionHandle` or `PollScheduler` from a hook deadlocks.
pub trait TickHook: Send {
    fn name(&self) -> &str {
        "tick-hook"
    }

    fn on_tick(&mut self, ctx: TickContext<'_>) -> anyhow::Result<()>;
}

/// What happened when a tick was requested.
#[derive(Debug)]
pub enum TickOutcome {
    Completed {
        tick: u64,
        report: TickReport,
        event: Option<EventId>,
    },
    Failed {
        tick: u64,
        error: TickError,
    },
    /// The session was not running; nothing was touched.
    Skipped(SessionStatus),
}

impl TickOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TickOutcome::Completed { .. })
    }
}

/// Render-path copy of a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub name: String,
    pub status: SessionStatus,
    pub tick_count: u64,
    pub failed_ticks: u64,
    pub metrics: MetricsSnapshot,
    pub events: Vec<ActivityEvent>,
}

/// One dashboard's simulated polling state.
pub struct Session {
    name: String,
    status: SessionStatus,
    run_id: u64,
    store: MetricStore,
    log: ActivityLog,
    driver: Box<dyn MetricDriver>,
    activity: Option<ActivityGenerator>,
    hooks: Vec<Box<dyn TickHook>>,
    rng: Box<dyn RandomSource>,
    seed: Option<u64>,
    tick_count: u64,
    failed_ticks: u64,
}

impl Session {
    /// A stopped session with the randomized incrementer and an unseeded
    /// random source.
    pub fn new(name: impl Into<String>, store: MetricStore) -> Self {
        Self {
            name: name.into(),
            status: SessionStatus::Stopped,
            run_id: 0,
            store,
            log: ActivityLog::default(),
            driver: Box::new(Incrementer),
            activity: None,
            hooks: Vec::new(),
            rng: Box::new(SeededSource::from_entropy()),
            seed: None,
            tick_count: 0,
            failed_ticks: 0,
        }
    }

    pub fn with_driver(mut self, driver: impl MetricDriver + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    pub fn with_activity(mut self, generator: ActivityGenerator) -> Self {
        self.activity = Some(generator);
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = ActivityLog::new(capacity);
        self
    }

    /// Seeded sessions reseed on every start, so each run replays the same
    /// sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Box::new(SeededSource::new(seed));
        self.seed = Some(seed);
        self
    }

    /// Inject an arbitrary random source. It is not rewound on restart.
    pub fn with_random_source(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self.seed = None;
        self
    }

    pub fn with_hook(mut self, hook: impl TickHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn failed_ticks(&self) -> u64 {
        self.failed_ticks
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            name: self.name.clone(),
            status: self.status,
            tick_count: self.tick_count,
            failed_ticks: self.failed_ticks,
            metrics: self.store.snapshot(),
            events: self.log.list(),
        }
    }

    /// `Stopped -> Starting`: baseline metrics, empty log, fresh counters.
    /// Returns the id of the new run.
    pub(crate) fn begin(&mut self) -> Result<u64, SchedulerError> {
        if self.status != SessionStatus::Stopped {
            return Err(SchedulerError::AlreadyActive(self.status));
        }
        self.status = SessionStatus::Starting;
        self.run_id += 1;
        self.store.reset_all();
        self.log.clear();
        self.tick_count = 0;
        self.failed_ticks = 0;
        if let Some(seed) = self.seed {
            self.rng = Box::new(SeededSource::new(seed));
        }
        info!(
            session = %self.name,
            run = self.run_id,
            metrics = self.store.len(),
            "session starting"
        );
        Ok(self.run_id)
    }

    /// `Starting -> Running` for the given run. False if that run was
    /// stopped in the meantime.
    pub(crate) fn mark_running(&mut self, run_id: u64) -> bool {
        if self.run_id != run_id || self.status != SessionStatus::Starting {
            return false;
        }
        self.status = SessionStatus::Running;
        info!(session = %self.name, run = run_id, "session running");
        true
    }

    pub(crate) fn is_current(&self, run_id: u64) -> bool {
        self.run_id == run_id && self.status == SessionStatus::Running
    }

    /// `Running -> Stopping -> Stopped`: clears the feed and restores
    /// baselines. Returns false if already stopped.
    pub(crate) fn halt(&mut self) -> bool {
        if self.status == SessionStatus::Stopped {
            return false;
        }
        self.status = SessionStatus::Stopping;
        self.run_id += 1;
        self.log.clear();
        self.store.reset_all();
        self.status = SessionStatus::Stopped;
        info!(
            session = %self.name,
            ticks = self.tick_count,
            failed = self.failed_ticks,
            "session stopped"
        );
        true
    }

    /// Execute one tick if running: driver, then activity, then hooks.
    ///
    /// Failures and panics are caught and counted; they never escape.
    pub fn run_tick(&mut self) -> TickOutcome {
        if self.status != SessionStatus::Running {
            return TickOutcome::Skipped(self.status);
        }
        self.tick_count += 1;
        let tick = self.tick_count;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.tick_body(tick)))
            .unwrap_or_else(|payload| Err(TickError::Panicked(panic_message(payload.as_ref()))));
        match result {
            Ok((report, event)) => {
                debug!(
                    session = %self.name,
                    tick,
                    changed = report.changed,
                    clamped = report.clamped,
                    event = ?event,
                    "tick"
                );
                TickOutcome::Completed {
                    tick,
                    report,
                    event,
                }
            }
            Err(error) => {
                self.failed_ticks += 1;
                warn!(session = %self.name, tick, %error, "tick failed, schedule continues");
                TickOutcome::Failed { tick, error }
            }
        }
    }

    fn tick_body(&mut self, tick: u64) -> Result<(TickReport, Option<EventId>), TickError> {
        let report = self
            .driver
            .drive(&mut self.store, self.rng.as_mut())
            .map_err(|source| TickError::Driver {
                driver: self.driver.name().to_string(),
                source,
            })?;

        let mut event_id = None;
        if let Some(generator) = self.activity.as_mut() {
            if let Some(event) = generator.maybe_generate(self.rng.as_mut(), &self.store) {
                event_id = Some(event.id());
                self.log.push(event);
            }
        }

        let mut first_error = None;
        for hook in &mut self.hooks {
            let ctx = TickContext {
                session: &self.name,
                tick,
                store: &self.store,
                log: &self.log,
            };
            if let Err(err) = hook.on_tick(ctx) {
                if first_error.is_none() {
                    first_error = Some(TickError::Hook {
                        hook: hook.name().to_string(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok((report, event_id)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{Emphasis, MetricDef, MetricFormat};
    use pulse_sim::{DeltaFeed, DriverError, MessageTemplate, ScriptedSource};

    fn store() -> MetricStore {
        MetricStore::from_defs([
            MetricDef::new("revenue", 1_000.0, 0.0, 100_000.0)
                .step(10.0, 90.0)
                .format(MetricFormat::Currency),
            MetricDef::new("sales", 3.0, 0.0, 500.0).step(0.0, 2.0),
        ])
    }

    fn running(session: &mut Session) {
        let run = session.begin().unwrap();
        assert!(session.mark_running(run));
    }

    struct Failing;

    impl MetricDriver for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn drive(
            &mut self,
            _store: &mut MetricStore,
            _rng: &mut dyn RandomSource,
        ) -> Result<TickReport, DriverError> {
            Err(DriverError::Unavailable("backend down".into()))
        }
    }

    #[test]
    fn tick_skipped_unless_running() {
        let mut s = Session::new("bot", store()).with_seed(1);
        assert!(matches!(
            s.run_tick(),
            TickOutcome::Skipped(SessionStatus::Stopped)
        ));
        s.begin().unwrap();
        assert!(matches!(
            s.run_tick(),
            TickOutcome::Skipped(SessionStatus::Starting)
        ));
        assert_eq!(s.tick_count(), 0);
    }

    #[test]
    fn begin_twice_rejected() {
        let mut s = Session::new("bot", store());
        s.begin().unwrap();
        assert_eq!(
            s.begin(),
            Err(SchedulerError::AlreadyActive(SessionStatus::Starting))
        );
    }

    #[test]
    fn stale_run_cannot_mark_running() {
        let mut s = Session::new("bot", store());
        let run = s.begin().unwrap();
        assert!(s.halt());
        assert!(!s.mark_running(run));
        assert_eq!(s.status(), SessionStatus::Stopped);
        assert!(!s.halt());
    }

    #[test]
    fn tick_updates_metrics_and_feed() {
        let generator = ActivityGenerator::new(
            vec![MessageTemplate::new("Sale! revenue now {revenue}", Emphasis::Success)],
            1.0,
        );
        let mut s = Session::new("profit", store())
            .with_random_source(ScriptedSource::new(vec![0.5]))
            .with_activity(generator)
            .with_log_capacity(3);
        running(&mut s);
        let outcome = s.run_tick();
        assert!(outcome.is_completed());
        // revenue: 1000 + 10 + 80*0.5; sales: 3 + round(1.0)
        assert_eq!(s.store().get("revenue").unwrap().value(), 1_050.0);
        assert_eq!(s.store().get("sales").unwrap().value(), 4.0);
        assert_eq!(
            s.log().latest().unwrap().message(),
            "Sale! revenue now €1,050.00"
        );
    }

    #[test]
    fn driver_failure_counted_and_session_keeps_running() {
        let mut s = Session::new("bot", store()).with_driver(Failing);
        running(&mut s);
        match s.run_tick() {
            TickOutcome::Failed { tick, error } => {
                assert_eq!(tick, 1);
                assert!(error.to_string().contains("backend down"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(s.failed_ticks(), 1);
        assert_eq!(s.status(), SessionStatus::Running);
    }

    #[test]
    fn hook_panic_is_contained() {
        struct Boom;
        impl TickHook for Boom {
            fn on_tick(&mut self, ctx: TickContext<'_>) -> anyhow::Result<()> {
                if ctx.tick == 2 {
                    panic!("hook exploded");
                }
                Ok(())
            }
        }
        let mut s = Session::new("bot", store()).with_seed(3).with_hook(Boom);
        running(&mut s);
        assert!(s.run_tick().is_completed());
        match s.run_tick() {
            TickOutcome::Failed {
                error: TickError::Panicked(msg),
                ..
            } => assert_eq!(msg, "hook exploded"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(s.run_tick().is_completed());
        assert_eq!(s.tick_count(), 3);
        assert_eq!(s.failed_ticks(), 1);
    }

    #[test]
    fn hook_context_reflects_current_tick() {
        struct Capture(std::sync::Arc<std::sync::Mutex<Vec<(u64, f64, usize)>>>);
        impl TickHook for Capture {
            fn on_tick(&mut self, ctx: TickContext<'_>) -> anyhow::Result<()> {
                let revenue = ctx.store.get("revenue").map_or(f64::NAN, |m| m.value());
                self.0
                    .lock()
                    .map_err(|_| anyhow::anyhow!("capture poisoned"))?
                    .push((ctx.tick, revenue, ctx.log.len()));
                Ok(())
            }
        }
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let generator =
            ActivityGenerator::new(vec![MessageTemplate::new("ping", Emphasis::Info)], 1.0);
        let mut s = Session::new("bot", store())
            .with_seed(5)
            .with_activity(generator)
            .with_hook(Capture(std::sync::Arc::clone(&seen)));
        running(&mut s);
        for tick in 1..=3u64 {
            s.run_tick();
            let last = *seen.lock().unwrap().last().unwrap();
            assert_eq!(last.0, tick);
            assert_eq!(last.1, s.store().get("revenue").unwrap().value());
            assert_eq!(last.2, s.log().len());
        }
    }

    #[test]
    fn halt_resets_metrics_and_clears_log() {
        let generator =
            ActivityGenerator::new(vec![MessageTemplate::new("ping", Emphasis::Info)], 1.0);
        let mut s = Session::new("fusion", store())
            .with_seed(11)
            .with_activity(generator);
        running(&mut s);
        for _ in 0..5 {
            s.run_tick();
        }
        assert_eq!(s.log().len(), 5);
        assert!(s.halt());
        let snap = s.snapshot();
        assert_eq!(snap.status, SessionStatus::Stopped);
        assert!(snap.events.is_empty());
        assert_eq!(snap.metrics.value("revenue"), Some(1_000.0));
        assert_eq!(snap.metrics.value("sales"), Some(3.0));
    }

    #[test]
    fn seeded_restart_replays_the_same_run() {
        let mut s = Session::new("bot", store()).with_seed(42);
        let run = |s: &mut Session| {
            running(s);
            let values: Vec<MetricsSnapshot> = (0..10)
                .map(|_| {
                    s.run_tick();
                    s.store().snapshot()
                })
                .collect();
            s.halt();
            values
        };
        let first = run(&mut s);
        let second = run(&mut s);
        assert_eq!(first, second);
    }

    #[test]
    fn delta_feed_session() {
        let (feed, tx) = DeltaFeed::channel();
        let mut s = Session::new("live", store()).with_driver(feed);
        running(&mut s);
        tx.delta("sales", 7.0);
        tx.set("revenue", 2_500.0);
        s.run_tick();
        assert_eq!(s.store().get("sales").unwrap().value(), 10.0);
        assert_eq!(s.store().get("revenue").unwrap().value(), 2_500.0);
    }

    #[test]
    fn snapshot_json_shape() {
        let s = Session::new("bot", store());
        let json = serde_json::to_value(s.snapshot()).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["metrics"][0]["key"], "revenue");
        assert!(json["events"].as_array().unwrap().is_empty());
    }
}
