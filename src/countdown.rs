//! Countdown: a single-purpose one-second ticking clock.
//!
//! A `Countdown` owns at most one tick schedule. Starting it again, cancelling
//! it, or dropping it tears the previous schedule down first, so a superseded
//! horizon can never keep ticking next to a new one.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// A cancellable countdown that invokes callbacks once per second.
#[derive(Debug)]
pub struct Countdown {
    name: &'static str,
    /// Bumped on every start/cancel. A running schedule checks it before each
    /// callback and stops as soon as it no longer matches.
    generation: Arc<AtomicU64>,
    remaining: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: Arc::new(AtomicU64::new(0)),
            remaining: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Seconds left on the current schedule (0 when idle or expired).
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Whether a tick schedule is currently live.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start counting down from `seconds`.
    ///
    /// `on_tick(remaining)` runs after each one-second decrement that leaves
    /// time on the clock; `on_expire()` runs exactly once when it reaches zero,
    /// after which the schedule ends on its own. With `seconds <= 0` the expire
    /// callback runs before this returns and nothing is scheduled.
    ///
    /// Any schedule already running is cancelled first.
    pub fn start<T, E>(&mut self, seconds: i64, mut on_tick: T, on_expire: E)
    where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.cancel();
        let generation = self.generation.load(Ordering::SeqCst);

        if seconds <= 0 {
            self.remaining.store(0, Ordering::SeqCst);
            run_guarded(self.name, on_expire);
            return;
        }

        let total = seconds.unsigned_abs();
        self.remaining.store(total, Ordering::SeqCst);

        let name = self.name;
        let current = Arc::clone(&self.generation);
        let remaining = Arc::clone(&self.remaining);

        self.handle = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            let mut left = total;
            let mut on_expire = Some(on_expire);

            loop {
                interval.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }

                left -= 1;
                remaining.store(left, Ordering::SeqCst);

                if left == 0 {
                    if let Some(expire) = on_expire.take() {
                        run_guarded(name, expire);
                    }
                    tracing::debug!(timer = name, "Countdown expired");
                    return;
                }

                if !run_guarded(name, || on_tick(left)) {
                    return;
                }
            }
        }));

        tracing::debug!(timer = self.name, seconds, "Countdown started");
    }

    /// Stop future ticks. Safe on an idle, expired or already-cancelled timer.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                tracing::debug!(timer = self.name, "Countdown cancelled");
            }
            handle.abort();
        }
        self.remaining.store(0, Ordering::SeqCst);
    }

    /// Cancel followed by start.
    pub fn restart<T, E>(&mut self, seconds: i64, on_tick: T, on_expire: E)
    where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.start(seconds, on_tick, on_expire);
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run a timer callback, containing any panic. Returns `false` when the
/// callback faulted and the schedule must stop.
fn run_guarded(name: &'static str, callback: impl FnOnce()) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!(timer = name, "Countdown callback panicked; cancelling timer");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq, Eq)]
    enum Fired {
        Tick(&'static str, u64),
        Expire(&'static str),
    }

    fn recorder() -> (mpsc::UnboundedSender<Fired>, mpsc::UnboundedReceiver<Fired>) {
        mpsc::unbounded_channel()
    }

    fn start_tagged(
        countdown: &mut Countdown,
        seconds: i64,
        tag: &'static str,
        tx: &mpsc::UnboundedSender<Fired>,
    ) {
        let tick_tx = tx.clone();
        let expire_tx = tx.clone();
        countdown.start(
            seconds,
            move |left| {
                let _ = tick_tx.send(Fired::Tick(tag, left));
            },
            move || {
                let _ = expire_tx.send(Fired::Expire(tag));
            },
        );
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Fired>) -> Vec<Fired> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_down_then_expires_once() {
        let (tx, mut rx) = recorder();
        let mut countdown = Countdown::new("resend");
        start_tagged(&mut countdown, 3, "a", &tx);
        assert!(countdown.is_active());
        assert_eq!(countdown.remaining(), 3);

        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(
            drain(&mut rx),
            vec![Fired::Tick("a", 2), Fired::Tick("a", 1), Fired::Expire("a")]
        );
        assert_eq!(countdown.remaining(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_seconds_expires_immediately_without_scheduling() {
        let (tx, mut rx) = recorder();
        let mut countdown = Countdown::new("expiry");
        start_tagged(&mut countdown, 0, "z", &tx);

        // Fired before any await point.
        assert_eq!(drain(&mut rx), vec![Fired::Expire("z")]);
        assert!(!countdown.is_active());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn negative_seconds_behave_like_zero() {
        let (tx, mut rx) = recorder();
        let mut countdown = Countdown::new("expiry");
        start_tagged(&mut countdown, -4, "n", &tx);
        assert_eq!(drain(&mut rx), vec![Fired::Expire("n")]);
        assert!(!countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_drops_the_old_horizon() {
        let (tx, mut rx) = recorder();
        let mut countdown = Countdown::new("expiry");
        start_tagged(&mut countdown, 100, "old", &tx);

        let tick_tx = tx.clone();
        let expire_tx = tx.clone();
        countdown.restart(
            5,
            move |left| {
                let _ = tick_tx.send(Fired::Tick("new", left));
            },
            move || {
                let _ = expire_tx.send(Fired::Expire("new"));
            },
        );

        tokio::time::sleep(Duration::from_secs(10)).await;

        let fired = drain(&mut rx);
        assert_eq!(
            fired,
            vec![
                Fired::Tick("new", 4),
                Fired::Tick("new", 3),
                Fired::Tick("new", 2),
                Fired::Tick("new", 1),
                Fired::Expire("new"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks_and_is_idempotent() {
        let (tx, mut rx) = recorder();
        let mut countdown = Countdown::new("resend");

        // Never started.
        countdown.cancel();

        start_tagged(&mut countdown, 3, "c", &tx);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        countdown.cancel();
        countdown.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drain(&mut rx), vec![Fired::Tick("c", 2)]);
        assert_eq!(countdown.remaining(), 0);
        assert!(!countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let (tx, mut rx) = recorder();
        {
            let mut countdown = Countdown::new("resend");
            start_tagged(&mut countdown, 2, "d", &tx);
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_stops_the_schedule() {
        let (tx, mut rx) = recorder();
        let mut countdown = Countdown::new("expiry");
        let expire_tx = tx.clone();
        countdown.start(
            5,
            |_| panic!("render failed"),
            move || {
                let _ = expire_tx.send(Fired::Expire("p"));
            },
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!countdown.is_active());
    }
}
