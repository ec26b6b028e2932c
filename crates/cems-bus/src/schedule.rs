//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Periodic generation timers for the live metrics bus."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Identifies one timer incarnation. A tick only publishes while the bus still
/// maps its classroom to the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

impl TimerToken {
    pub(crate) fn next(source: &AtomicU64) -> Self {
        Self(source.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Fixed-period ticker whose first tick lands one period after `start`.
#[derive(Debug)]
pub struct PeriodicTicker {
    interval: tokio::time::Interval,
}

impl PeriodicTicker {
    /// Must be called from within a tokio runtime.
    pub fn starting_at(first_tick: Instant, period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(first_tick, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Spawn a task calling `on_tick` every `period`, first after one full period.
///
/// The loop ends when `on_tick` returns `false` or the task is aborted.
pub(crate) fn spawn_periodic<F>(runtime: &Handle, period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    // Anchor to the caller's clock so the cadence does not depend on when
    // the task is first polled.
    let first_tick = Instant::now() + period;
    runtime.spawn(async move {
        let mut ticker = PeriodicTicker::starting_at(first_tick, period);
        loop {
            ticker.tick().await;
            if !on_tick() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tokens_are_unique() {
        let source = AtomicU64::new(0);
        let a = TimerToken::next(&source);
        let b = TimerToken::next(&source);
        assert_ne!(a, b);
        assert_eq!(b.get(), a.get() + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_waits_one_period_before_first_tick() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let handle = spawn_periodic(&Handle::current(), Duration::from_secs(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(10_200)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_stops_when_callback_declines() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let handle = spawn_periodic(&Handle::current(), Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst) < 1
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(handle.is_finished());
    }
}
