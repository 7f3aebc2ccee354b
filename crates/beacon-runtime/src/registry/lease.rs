use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use beacon_core::error::{BeaconError, Result};

/// Fixed-delay background task that keeps a registry lease alive.
///
/// Created armed; [`activate`](Self::activate) spawns the task, which waits
/// one period, runs a tick, and waits one period again after the tick
/// completes. Ticks never overlap and missed periods are not caught up.
/// Tick errors and panics are logged and discarded.
pub struct LeaseScheduler {
    period: Duration,
    stop_timeout: Duration,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LeaseScheduler {
    /// Arm a scheduler without starting it.
    pub fn new(period: Duration, stop_timeout: Duration) -> Self {
        Self {
            period,
            stop_timeout,
            token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Renewal period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the renewal task has been spawned and is still running.
    pub fn is_active(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the renewal task running `tick` inside `span`.
    ///
    /// Returns `false` without spawning if the task already exists or the
    /// scheduler was cancelled; a cancelled scheduler never activates again.
    pub fn activate<F, Fut>(&self, tick: F, span: tracing::Span) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut handle = lock(&self.handle);
        if handle.is_some() || self.token.is_cancelled() {
            return false;
        }

        let task = run_fixed_delay(self.period, self.token.clone(), tick);
        *handle = Some(tokio::spawn(task.instrument(span)));
        true
    }

    /// Cancel the renewal task and wait for it to finish.
    ///
    /// An in-flight tick is interrupted at its next await point. If the task
    /// has not finished within the stop timeout it is aborted and an error
    /// is returned; the scheduler stays cancelled either way.
    pub async fn cancel(&self) -> Result<()> {
        self.token.cancel();

        let handle = lock(&self.handle).take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BeaconError::InvalidState(format!(
                "Renewal task ended abnormally: {}",
                e
            ))),
            Err(_) => {
                handle.abort();
                Err(BeaconError::InvalidState(format!(
                    "Renewal task did not stop within {:?} and was aborted",
                    self.stop_timeout
                )))
            }
        }
    }
}

impl Drop for LeaseScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_fixed_delay<F, Fut>(period: Duration, token: CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    tracing::debug!(period = ?period, "Lease renewal started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("In-flight renewal interrupted");
                break;
            }
            outcome = AssertUnwindSafe(async { tick().await }).catch_unwind() => outcome,
        };

        match outcome {
            Ok(Ok(())) => tracing::trace!("Lease renewed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Lease renewal failed"),
            Err(panic) => tracing::error!(
                panic = %panic_message(panic.as_ref()),
                "Lease renewal panicked"
            ),
        }
    }

    tracing::debug!("Lease renewal stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
