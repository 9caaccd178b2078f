//! Restartable periodic task used for session liveness.
//!
//! [`Heartbeat`] owns at most one background task at a time. The interval
//! may be changed while stopped or running; a change takes effect the next
//! time the task starts. `start` and `stop` are idempotent.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Callback run on every tick.
pub type HeartbeatTick = Arc<dyn Fn() + Send + Sync>;

/// Shortest interval accepted; `tokio` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct HeartbeatState {
    interval: Duration,
    running: Option<CancellationToken>,
}

/// Cancellable periodic task with a mutable interval.
///
/// The first tick fires one full interval after [`start`](Self::start).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use steamframe::heartbeat::Heartbeat;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let heartbeat = Heartbeat::new(
///     tokio::runtime::Handle::current(),
///     Duration::from_secs(5),
///     || println!("tick"),
/// );
/// heartbeat.start();
/// assert!(heartbeat.is_running());
/// heartbeat.stop();
/// assert!(!heartbeat.is_running());
/// # }
/// ```
pub struct Heartbeat {
    runtime: Handle,
    tick: HeartbeatTick,
    state: Mutex<HeartbeatState>,
}

impl Heartbeat {
    /// Create a stopped heartbeat that will call `tick` every `interval`.
    pub fn new<F>(runtime: Handle, interval: Duration, tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            runtime,
            tick: Arc::new(tick),
            state: Mutex::new(HeartbeatState {
                interval: interval.max(MIN_INTERVAL),
                running: None,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HeartbeatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently configured interval.
    #[must_use]
    pub fn interval(&self) -> Duration { self.state().interval }

    /// Change the interval used the next time the task starts.
    pub fn set_interval(&self, interval: Duration) { self.state().interval = interval.max(MIN_INTERVAL); }

    /// Returns `true` while the background task is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool { self.state().running.is_some() }

    /// Start ticking. Does nothing if already running.
    pub fn start(&self) {
        let mut state = self.state();
        if state.running.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let period = state.interval;
        let tick = Arc::clone(&self.tick);
        let cancelled = token.clone();
        self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    () = cancelled.cancelled() => break,

                    _ = ticker.tick() => {
                        if catch_unwind(AssertUnwindSafe(|| tick())).is_err() {
                            warn!("heartbeat tick panicked");
                        }
                    }
                }
            }
        });

        debug!(?period, "heartbeat started");
        state.running = Some(token);
    }

    /// Stop ticking. Does nothing if already stopped.
    pub fn stop(&self) {
        if let Some(token) = self.state().running.take() {
            token.cancel();
            debug!("heartbeat stopped");
        }
    }

    /// Stop, replace the interval and start again.
    pub fn restart(&self, interval: Duration) {
        self.stop();
        self.set_interval(interval);
        self.start();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) { self.stop(); }
}
