//! Re-fetch the visible history while any job in it is still pending.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Something the scheduler refreshes on every tick.
pub trait PollTarget: Send + Sync + 'static {
    /// Refresh once and report how many pending records are visible.
    fn poll_once(&self) -> impl Future<Output = usize> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Continue,
    Stop,
}

/// Timer-independent state of the scheduler.
#[derive(Debug, Default)]
pub struct PollGate {
    running: bool,
    rearmed: bool,
}

impl PollGate {
    /// Returns true when the caller has to start a timer. A request made while
    /// one runs keeps it alive for at least one more tick.
    pub fn request_start(&mut self) -> bool {
        if self.running {
            self.rearmed = true;
            return false;
        }
        self.running = true;
        self.rearmed = false;
        true
    }

    pub fn after_tick(&mut self, pending: usize) -> TickDecision {
        let rearmed = std::mem::take(&mut self.rearmed);
        if pending > 0 || rearmed {
            TickDecision::Continue
        } else {
            self.running = false;
            TickDecision::Stop
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.rearmed = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// A single repeating timer with no backoff and no tick limit; it runs for as
/// long as pending work stays visible.
pub struct PollScheduler {
    interval: Duration,
    gate: Arc<Mutex<PollGate>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            gate: Arc::new(Mutex::new(PollGate::default())),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        lock(&self.gate).is_running()
    }

    /// Start polling `target`. Returns false when a timer is already running.
    /// The first tick fires one interval after the start.
    pub fn start<T: PollTarget>(&self, target: Arc<T>) -> bool {
        if !lock(&self.gate).request_start() {
            debug!("Polling already running");
            return false;
        }

        info!("Polling started (every {:?})", self.interval);
        let gate = Arc::clone(&self.gate);
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let pending = target.poll_once().await;

                if lock(&gate).after_tick(pending) == TickDecision::Stop {
                    info!("No pending records remain, polling stopped");
                    break;
                }
                debug!("{} pending records, polling continues", pending);
            }
        });

        *lock(&self.task) = Some(handle);
        true
    }

    pub fn stop(&self) {
        lock(&self.gate).stop();
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
