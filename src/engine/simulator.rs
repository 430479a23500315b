use std::future::Future;
use std::ops::ControlFlow;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep, sleep_until};
use tracing::debug;

/// Ticks needed to take a delivery from 0 to 1 at 1x speed.
pub const FULL_DELIVERY_TICKS: f64 = 600.0;

// absorbs float accumulation so 600 ticks at 1x land exactly on 1.0
const COMPLETION_EPSILON: f64 = 1e-9;

/// Repeating timer that corrects for its own lateness.
///
/// Each firing schedules the next one `interval - drift` later, where drift is
/// how far the current firing (callback included) ran past its expected time.
/// Firings stay anchored to `start + n * interval` instead of accumulating
/// callback time. Ticks never overlap: the callback is awaited before the next
/// delay is computed.
pub struct ProgressSimulator {
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ProgressSimulator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts ticking. A running simulator is stopped first. The loop ends
    /// when the callback returns `ControlFlow::Break`.
    pub fn start<F, Fut>(&mut self, mut on_tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        self.stop();

        let interval = self.interval;
        self.handle = Some(tokio::spawn(async move {
            let mut expected = Instant::now() + interval;
            sleep_until(expected).await;

            loop {
                if on_tick().await.is_break() {
                    debug!("simulator callback requested stop");
                    break;
                }

                let drift = Instant::now().saturating_duration_since(expected);
                expected += interval;
                sleep(interval.saturating_sub(drift)).await;
            }
        }));
    }

    /// Cancels any pending firing. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Waits until the tick loop ends on its own (or was stopped).
    pub async fn finished(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Local delivery progress fraction, advanced once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressTracker {
    fraction: f64,
}

impl ProgressTracker {
    pub fn new(initial: f64) -> Self {
        Self {
            fraction: initial.clamp(0.0, 1.0),
        }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }

    /// Adds `speed / FULL_DELIVERY_TICKS`, stopping at 1.0.
    pub fn advance(&mut self, speed: f64) -> f64 {
        let step = speed.max(0.0) / FULL_DELIVERY_TICKS;
        let next = self.fraction + step;
        self.fraction = if next >= 1.0 - COMPLETION_EPSILON {
            1.0
        } else {
            next
        };
        self.fraction
    }
}
