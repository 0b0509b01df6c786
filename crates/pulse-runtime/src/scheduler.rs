use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::session::{Session, SessionSnapshot, SessionStatus, TickOutcome};
use crate::SchedulerError;

/// Shortest accepted tick interval.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Drives a [`Session`] on a fixed interval.
///
/// The whole tick runs under the session lock, and [`stop`](Self::stop)
/// takes the same lock, so no tick can land after `stop` returns. Dropping
/// the scheduler stops it.
pub struct PollScheduler {
    session: Arc<Mutex<Session>>,
    tick_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl PollScheduler {
    pub fn new(session: Session, tick_interval: Duration) -> Result<Self, SchedulerError> {
        check_interval(tick_interval)?;
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tick_interval,
            task: None,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Change the interval used by the next [`start`](Self::start).
    pub fn set_tick_interval(&mut self, interval: Duration) -> Result<Duration, SchedulerError> {
        check_interval(interval)?;
        Ok(std::mem::replace(&mut self.tick_interval, interval))
    }

    /// Begin periodic ticking on the current tokio runtime.
    ///
    /// Metrics are reset to baseline and the first tick fires one full
    /// interval after this call.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let run_id = self.session.lock().begin()?;
        let session = Arc::clone(&self.session);
        let period = self.tick_interval;
        self.task = Some(runtime.spawn(run_loop(session, run_id, period)));
        Ok(())
    }

    /// Enter `Running` without a timer; ticks happen only via
    /// [`tick_now`](Self::tick_now). Needs no runtime.
    pub fn start_stepped(&mut self) -> Result<(), SchedulerError> {
        let mut session = self.session.lock();
        let run_id = session.begin()?;
        session.mark_running(run_id);
        Ok(())
    }

    /// Run one tick immediately on the caller's thread.
    pub fn tick_now(&self) -> TickOutcome {
        self.session.lock().run_tick()
    }

    /// Stop ticking, clear the feed and restore baselines. Returns false if
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        let mut session = self.session.lock();
        let stopped = session.halt();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        stopped
    }

    pub fn status(&self) -> SessionStatus {
        self.session.lock().status()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    /// Cloneable read-only handle for render paths.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session: Arc::clone(&self.session),
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read-only access to a scheduled session.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.session.lock().status()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }
}

fn check_interval(interval: Duration) -> Result<(), SchedulerError> {
    if interval < MIN_TICK_INTERVAL {
        return Err(SchedulerError::IntervalTooShort(interval));
    }
    Ok(())
}

async fn run_loop(session: Arc<Mutex<Session>>, run_id: u64, period: Duration) {
    if !session.lock().mark_running(run_id) {
        debug!(run = run_id, "run stopped before it began");
        return;
    }
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let current = {
            let mut guard = session.lock();
            if guard.is_current(run_id) {
                guard.run_tick();
                true
            } else {
                false
            }
        };
        if !current {
            info!(run = run_id, "poll loop exiting");
            break;
        }
    }
}
