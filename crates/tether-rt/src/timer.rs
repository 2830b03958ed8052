//! Async timer.
//!
//! Registers a one-shot deadline with the reactor of the executor driving the
//! polling task and resolves once the deadline passes.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

use crate::executor::Executor;
use crate::reactor::Reactor;
use crate::registry;

/// Deadline used when `now + duration` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Reactor for timers polled outside any executor, driven by one shared
/// thread. `None` if the poller or the thread could not be created.
static HELPER: OnceLock<Option<Arc<Reactor>>> = OnceLock::new();

fn helper_reactor() -> Option<Arc<Reactor>> {
    HELPER
        .get_or_init(|| {
            let reactor = match Reactor::new() {
                Ok(reactor) => Arc::new(reactor),
                Err(err) => {
                    tracing::warn!(error = %err, "timer helper reactor unavailable");
                    return None;
                }
            };
            let driver = reactor.clone();
            let spawned = thread::Builder::new()
                .name("tether-timer".to_string())
                .spawn(move || loop {
                    if let Err(err) = driver.react(None) {
                        tracing::warn!(error = %err, "timer helper wait failed");
                        thread::sleep(crate::config::DEFAULT_IDLE_TIMEOUT);
                    }
                });
            match spawned {
                Ok(_) => Some(reactor),
                Err(err) => {
                    tracing::warn!(error = %err, "timer helper thread unavailable");
                    None
                }
            }
        })
        .clone()
}

/// Sleep for the given duration.
///
/// This is a convenience wrapper around `Timer::after(duration).await`.
pub async fn sleep(duration: Duration) {
    Timer::after(duration).await
}

/// A one-shot timer that resolves at a deadline.
///
/// Created via [`Timer::after`] or [`Timer::at`]. Cancels its reactor entry on
/// drop if it hasn't fired yet. Polled outside any executor, it registers with
/// a shared helper thread instead.
pub struct Timer {
    deadline: Instant,
    registration: Option<Registration>,
    fired: bool,
}

enum Registration {
    Executor { executor: Weak<Executor>, id: u64 },
    Helper { reactor: Arc<Reactor>, id: u64 },
    /// No helper thread: re-poll on every wake until the deadline.
    Spin,
}

impl Timer {
    /// Create a timer that fires after the given duration.
    pub fn after(duration: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(duration)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self::at(deadline)
    }

    /// Create a timer that fires at `deadline`.
    pub fn at(deadline: Instant) -> Self {
        Timer {
            deadline,
            registration: None,
            fired: false,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn register(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match &self.registration {
            Some(Registration::Executor { executor, id }) => {
                return match executor.upgrade() {
                    Some(executor) => executor.reactor().timer_poll(*id, cx.waker().clone()),
                    // The executor is gone; nothing will ever fire us.
                    None => Poll::Ready(()),
                };
            }
            Some(Registration::Helper { reactor, id }) => {
                return reactor.timer_poll(*id, cx.waker().clone());
            }
            Some(Registration::Spin) => {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            None => {}
        }

        if let Some(executor) = registry::running() {
            let id = executor.reactor().timer_create(self.deadline);
            self.registration = Some(Registration::Executor {
                executor: Arc::downgrade(&executor),
                id,
            });
            return executor.reactor().timer_poll(id, cx.waker().clone());
        }

        match helper_reactor() {
            Some(reactor) => {
                let id = reactor.timer_create(self.deadline);
                let poll = reactor.timer_poll(id, cx.waker().clone());
                // The helper may be parked without a deadline.
                if let Err(err) = reactor.notify() {
                    tracing::warn!(error = %err, "timer helper notify failed");
                }
                self.registration = Some(Registration::Helper { reactor, id });
                poll
            }
            None => {
                self.registration = Some(Registration::Spin);
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.fired || Instant::now() >= self.deadline {
            self.fired = true;
            return Poll::Ready(());
        }
        match self.register(cx) {
            Poll::Ready(()) => {
                self.fired = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.fired {
            return;
        }
        match &self.registration {
            Some(Registration::Executor { executor, id }) => {
                if let Some(executor) = executor.upgrade() {
                    executor.reactor().timer_cancel(*id);
                }
            }
            Some(Registration::Helper { reactor, id }) => reactor.timer_cancel(*id),
            Some(Registration::Spin) | None => {}
        }
    }
}
