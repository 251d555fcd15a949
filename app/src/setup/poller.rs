//! Fixed-interval service polling with a cancel handle.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use onboard_ollama::ServiceStatus;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::service::Prober;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Stops a running poller. Cloning is cheap and every clone stops the same poller.
#[derive(Debug, Clone)]
pub struct PollHandle {
    token: CancellationToken,
}

impl PollHandle {
    /// Stop polling. Safe to call any number of times, from any thread,
    /// including from inside the update callback.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the poller has been told to stop
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Start probing every `interval` until cancelled.
///
/// The first probe fires one interval after the call. Ticks never overlap:
/// a slow probe delays the next one. `on_update` receives every status along
/// with the handle, so it can stop polling itself. No callback runs after
/// cancellation is observed, and a probe still in flight when the handle is
/// cancelled is dropped without reporting.
///
/// `token` scopes the poller; cancelling it (or any parent) stops polling too.
/// Must be called from within a tokio runtime.
pub fn start_polling<P, F>(
    prober: Arc<P>,
    interval: Duration,
    token: CancellationToken,
    mut on_update: F,
) -> PollHandle
where
    P: Prober + ?Sized + 'static,
    F: FnMut(&ServiceStatus, &PollHandle) + Send + 'static,
{
    let handle = PollHandle { token };
    let interval = interval.max(MIN_INTERVAL);
    let task_handle = handle.clone();

    tokio::spawn(async move {
        let handle = task_handle;
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Polling for service every {:?}", interval);

        loop {
            tokio::select! {
                biased;
                _ = handle.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                biased;
                _ = handle.cancelled() => break,
                status = prober.probe() => status,
            };

            if handle.is_cancelled() {
                break;
            }

            trace!("Poll result: running={}", status.is_running);
            on_update(&status, &handle);
        }

        debug!("Service polling stopped");
    });

    handle
}
