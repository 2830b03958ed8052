use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use polling::{Events, Poller};

/// Timer state: BTreeMap for ordered expiry iteration, HashMap for handle→deadline lookup.
struct TimerState {
    /// Timers ordered by (deadline, id) for efficient expiry scanning.
    heap: BTreeMap<(Instant, u64), Waker>,
    /// Reverse lookup: timer id → deadline, for cancel and poll by handle.
    deadlines: HashMap<u64, Instant>,
}

/// One executor's reactor: owns the OS poller used to park the driving
/// thread, and the timer heap.
///
/// The poller never has IO sources registered. `wait()` returns either on
/// timeout or when another thread calls `notify()` after pushing work.
pub(crate) struct Reactor {
    poller: Poller,
    timers: Mutex<TimerState>,
    timer_id: AtomicU64,
    events: Mutex<Events>,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Reactor {
            poller: Poller::new()?,
            timers: Mutex::new(TimerState {
                heap: BTreeMap::new(),
                deadlines: HashMap::new(),
            }),
            timer_id: AtomicU64::new(0),
            events: Mutex::new(Events::new()),
        })
    }

    /// Interrupt a thread parked in `react()`. Safe from any thread.
    pub(crate) fn notify(&self) -> io::Result<()> {
        self.poller.notify()
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Create a timer that fires at `deadline`. Returns an opaque timer handle.
    pub(crate) fn timer_create(&self, deadline: Instant) -> u64 {
        let id = self.timer_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.timers.lock();
        state.deadlines.insert(id, deadline);
        // Waker is stored on first timer_poll, not here.
        id
    }

    /// Cancel a pending timer. The stored waker (if any) is dropped, not woken.
    pub(crate) fn timer_cancel(&self, id: u64) {
        let mut state = self.timers.lock();
        if let Some(deadline) = state.deadlines.remove(&id) {
            state.heap.remove(&(deadline, id));
        }
    }

    /// Poll a timer. Returns Ready if deadline passed, Pending otherwise.
    pub(crate) fn timer_poll(&self, id: u64, waker: Waker) -> Poll<()> {
        let mut state = self.timers.lock();
        let deadline = match state.deadlines.get(&id) {
            Some(&d) => d,
            None => return Poll::Ready(()), // Already fired or cancelled.
        };

        if Instant::now() >= deadline {
            state.deadlines.remove(&id);
            state.heap.remove(&(deadline, id));
            return Poll::Ready(());
        }

        state.heap.insert((deadline, id), waker);
        Poll::Pending
    }

    /// Wake every pending timer regardless of deadline. Used on close so
    /// tasks parked on timers are rescheduled and then dropped.
    pub(crate) fn fire_all_timers(&self) {
        let wakers: Vec<Waker> = {
            let mut state = self.timers.lock();
            state.deadlines.clear();
            std::mem::take(&mut state.heap).into_values().collect()
        };
        for waker in wakers {
            waker.wake();
        }
    }

    // ── React ───────────────────────────────────────────────────────

    /// Fire expired timers, then park until the next deadline, the caller's
    /// timeout, or a `notify()`, whichever comes first.
    pub(crate) fn react(&self, timeout: Option<Duration>) -> io::Result<()> {
        let mut wakers = Vec::new();

        let next_timer = {
            let now = Instant::now();
            let mut state = self.timers.lock();
            loop {
                match state.heap.first_key_value().map(|(key, _)| *key) {
                    Some((deadline, id)) if deadline <= now => {
                        if let Some(waker) = state.heap.remove(&(deadline, id)) {
                            wakers.push(waker);
                        }
                        state.deadlines.remove(&id);
                    }
                    Some((deadline, _)) => break Some(deadline.duration_since(now)),
                    None => break None,
                }
            }
        };

        // Expired timers mean runnable work: don't park at all.
        let effective_timeout = if !wakers.is_empty() {
            Some(Duration::ZERO)
        } else {
            match (timeout, next_timer) {
                (None, None) => None,
                (Some(t), None) | (None, Some(t)) => Some(t),
                (Some(a), Some(b)) => Some(a.min(b)),
            }
        };

        {
            let mut events = self.events.lock();
            events.clear();
            self.poller.wait(&mut events, effective_timeout)?;
        }

        // Tasks re-enter the executor's ready queue.
        for waker in wakers {
            waker.wake();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::task::Wake;

    struct FlagWaker(AtomicBool);

    impl Wake for FlagWaker {
        fn wake(self: Arc<Self>) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn flag_waker() -> (Arc<FlagWaker>, Waker) {
        let flag = Arc::new(FlagWaker(AtomicBool::new(false)));
        (flag.clone(), Waker::from(flag))
    }

    #[test]
    fn timer_create_and_poll_expired() {
        let reactor = Reactor::new().unwrap();
        let id = reactor.timer_create(Instant::now());
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(
            reactor.timer_poll(id, futures::task::noop_waker()),
            Poll::Ready(())
        );
    }

    #[test]
    fn timer_create_and_poll_pending() {
        let reactor = Reactor::new().unwrap();
        let id = reactor.timer_create(Instant::now() + Duration::from_secs(1));
        assert_eq!(
            reactor.timer_poll(id, futures::task::noop_waker()),
            Poll::Pending
        );
        reactor.timer_cancel(id);
    }

    #[test]
    fn timer_cancel_removes_entry() {
        let reactor = Reactor::new().unwrap();
        let id = reactor.timer_create(Instant::now() + Duration::from_secs(1));
        assert_eq!(
            reactor.timer_poll(id, futures::task::noop_waker()),
            Poll::Pending
        );

        reactor.timer_cancel(id);

        // No entry left: reported as already fired.
        assert_eq!(
            reactor.timer_poll(id, futures::task::noop_waker()),
            Poll::Ready(())
        );
    }

    #[test]
    fn react_fires_expired_timers() {
        let reactor = Reactor::new().unwrap();
        let id = reactor.timer_create(Instant::now() + Duration::from_millis(10));
        let (flag, waker) = flag_waker();
        assert_eq!(reactor.timer_poll(id, waker), Poll::Pending);

        std::thread::sleep(Duration::from_millis(15));
        reactor.react(Some(Duration::ZERO)).unwrap();

        assert!(flag.0.load(Ordering::SeqCst), "timer waker should have fired");
    }

    #[test]
    fn react_waits_for_next_deadline() {
        let reactor = Reactor::new().unwrap();
        let id = reactor.timer_create(Instant::now() + Duration::from_millis(20));
        let (flag, waker) = flag_waker();
        assert_eq!(reactor.timer_poll(id, waker), Poll::Pending);

        // The long caller timeout is capped by the pending deadline.
        let start = Instant::now();
        while !flag.0.load(Ordering::SeqCst) {
            reactor.react(Some(Duration::from_secs(5))).unwrap();
            assert!(start.elapsed() < Duration::from_secs(2), "timer never fired");
        }
    }

    #[test]
    fn notify_interrupts_wait_from_another_thread() {
        let reactor = Arc::new(Reactor::new().unwrap());
        let remote = reactor.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.notify().unwrap();
        });

        let start = Instant::now();
        reactor.react(Some(Duration::from_secs(5))).unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "notify should cut the wait short"
        );
        handle.join().unwrap();
    }
}
