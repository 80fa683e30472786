//! Worker supervision: restart-with-backoff and cooperative shutdown.
//!
//! Every worker is a task built from a factory so it can be re-created after
//! a crash. Shutdown is a watch channel: workers finish their current batch,
//! commit, and return `Ok`, which ends supervision without a restart.

use crate::BoxError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const RESTART_BASE_SECS: f64 = 2.0;
const RESTART_FLOOR_SECS: f64 = 2.0;
const RESTART_CAP_SECS: f64 = 60.0;

/// Restart delay schedule: max(floor, base * 2^(exits-1)), capped.
#[derive(Debug)]
pub struct RestartBackoff {
    exit_count: u32,
}

impl RestartBackoff {
    pub fn new() -> Self {
        Self { exit_count: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.exit_count += 1;
        let exp = RESTART_BASE_SECS * 2f64.powi(self.exit_count as i32 - 1);
        Duration::from_secs_f64(exp.max(RESTART_FLOOR_SECS).min(RESTART_CAP_SECS))
    }
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `secs` unless shutdown arrives first. Returns true on shutdown.
pub async fn idle(shutdown: &mut watch::Receiver<bool>, secs: f64) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        changed = shutdown.changed() => {
            // A dropped sender means the orchestrator is gone: stop too.
            changed.is_err() || *shutdown.borrow()
        }
        _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => false,
    }
}

/// Spawn a named worker under supervision. The factory is invoked for every
/// (re)start; an `Err` exit restarts the worker after backoff, an `Ok` exit
/// ends supervision.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    shutdown: watch::Receiver<bool>,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = RestartBackoff::new();
        loop {
            log::info!("[{}] starting", name);
            match factory(shutdown.clone()).await {
                Ok(()) => {
                    log::info!("[{}] stopped", name);
                    return;
                }
                Err(e) => log::error!("[{}] exited with error: {}", name, e),
            }

            if *shutdown.borrow() {
                return;
            }
            let delay = backoff.next_delay();
            log::warn!("[{}] restarting in {:.0}s", name, delay.as_secs_f64());

            let mut shutdown_wait = shutdown.clone();
            if idle(&mut shutdown_wait, delay.as_secs_f64()).await {
                return;
            }
        }
    })
}
