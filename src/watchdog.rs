use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::error::EdgeError;

/// Heartbeat-monitored liveness guard. A background task wakes every
/// `timeout / 2` and, if nothing has called [`Watchdog::heartbeat`]
/// within `timeout`, invokes the configured handler; absent a handler,
/// the process aborts so a supervisor can restart it.
pub struct Watchdog {
    last_heartbeat: Arc<Mutex<Instant>>,
    timeout: StdDuration,
}

impl Watchdog {
    pub fn new(timeout: StdDuration) -> Self {
        Self {
            last_heartbeat: Arc::new(Mutex::new(Instant::now())),
            timeout,
        }
    }

    pub fn heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// Spawns the monitor task. `on_timeout` is called in place of the
    /// default abort if provided.
    pub fn spawn<F>(&self, on_timeout: Option<F>) -> tokio::task::JoinHandle<()>
    where
        F: Fn(EdgeError) + Send + 'static,
    {
        let last_heartbeat = self.last_heartbeat.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(timeout / 2).await;
                let elapsed = last_heartbeat.lock().elapsed();
                if elapsed > timeout {
                    let err = EdgeError::WatchdogTimeout {
                        elapsed_s: elapsed.as_secs_f64(),
                        limit_s: timeout.as_secs_f64(),
                    };
                    error!(%err, "control loop heartbeat missed");
                    match &on_timeout {
                        Some(handler) => handler(err),
                        None => {
                            error!("no watchdog handler registered, aborting process");
                            std::process::abort();
                        }
                    }
                } else {
                    info!(elapsed_s = elapsed.as_secs_f64(), "watchdog ok");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn heartbeat_within_timeout_does_not_trigger_handler() {
        let watchdog = Watchdog::new(StdDuration::from_millis(40));
        let triggered = Arc::new(AtomicBool::new(false));
        let triggered_clone = triggered.clone();
        let handle = watchdog.spawn(Some(move |_: EdgeError| {
            triggered_clone.store(true, Ordering::SeqCst);
        }));
        for _ in 0..5 {
            tokio::time::sleep(StdDuration::from_millis(15)).await;
            watchdog.heartbeat();
        }
        handle.abort();
        assert!(!triggered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn missed_heartbeat_triggers_handler() {
        let watchdog = Watchdog::new(StdDuration::from_millis(30));
        let triggered = Arc::new(AtomicBool::new(false));
        let triggered_clone = triggered.clone();
        let handle = watchdog.spawn(Some(move |_: EdgeError| {
            triggered_clone.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(StdDuration::from_millis(80)).await;
        handle.abort();
        assert!(triggered.load(Ordering::SeqCst));
    }
}
