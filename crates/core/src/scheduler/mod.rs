//! Background refresh scheduler.
//!
//! Three independent jobs over shared service instances:
//!
//! - hot-symbol refresh on a fixed interval (short TTL)
//! - trending refresh at the top of every hour
//! - nightly purge-and-rewarm at 02:00, which also sweeps the rate
//!   limiter's idle buckets
//!
//! A job that is still running when its next trigger fires skips that
//! tick rather than queueing it, and a failing run only logs - the
//! loops never exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::limits::RateLimiter;
use crate::quotes::QuoteService;

/// Minute of the hour the trending refresh fires on.
const TRENDING_REFRESH_MINUTE: u32 = 0;

/// Wall-clock time of the nightly purge (02:00 UTC).
const NIGHTLY_PURGE_HOUR: u32 = 2;
const NIGHTLY_PURGE_MINUTE: u32 = 0;

/// Timer-driven cache warmer.
pub struct RefreshScheduler {
    quotes: Arc<QuoteService>,
    limiter: Arc<RateLimiter>,
    hot_interval: Duration,
    initial_delay: Duration,
}

impl RefreshScheduler {
    pub fn new(
        quotes: Arc<QuoteService>,
        limiter: Arc<RateLimiter>,
        hot_interval: Duration,
        initial_delay: Duration,
    ) -> Self {
        Self {
            quotes,
            limiter,
            hot_interval,
            initial_delay,
        }
    }

    /// Spawn all jobs. The returned handles live as long as the
    /// process; aborting them is the shutdown path.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        let scheduler = Arc::new(self);
        vec![
            tokio::spawn(Arc::clone(&scheduler).hot_refresh_loop()),
            tokio::spawn(Arc::clone(&scheduler).trending_refresh_loop()),
            tokio::spawn(Arc::clone(&scheduler).nightly_purge_loop()),
        ]
    }

    async fn hot_refresh_loop(self: Arc<Self>) {
        info!(
            "Hot symbol refresh job started ({}s interval)",
            self.hot_interval.as_secs()
        );

        // Let the rest of the process come up first
        tokio::time::sleep(self.initial_delay).await;

        let running = Arc::new(AtomicBool::new(false));
        let mut ticker = interval(self.hot_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let quotes = Arc::clone(&self.quotes);
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                if !claim(&running) {
                    debug!("Hot symbol refresh still running, skipping tick");
                    return;
                }
                let outcome = quotes.refresh_hot_symbols().await;
                info!(
                    success = outcome.success,
                    failed = outcome.failed,
                    "Hot symbol refresh finished"
                );
                release(&running);
            });
        }
    }

    async fn trending_refresh_loop(self: Arc<Self>) {
        info!("Trending refresh job started (hourly at :00)");

        let running = Arc::new(AtomicBool::new(false));

        loop {
            tokio::time::sleep(until_next_hour_mark(TRENDING_REFRESH_MINUTE)).await;

            let quotes = Arc::clone(&self.quotes);
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                if !claim(&running) {
                    debug!("Trending refresh still running, skipping tick");
                    return;
                }
                let outcome = quotes.refresh_trending().await;
                info!(
                    success = outcome.success,
                    failed = outcome.failed,
                    "Trending refresh finished"
                );
                release(&running);
            });
        }
    }

    async fn nightly_purge_loop(self: Arc<Self>) {
        info!(
            "Nightly purge job started ({:02}:{:02} UTC)",
            NIGHTLY_PURGE_HOUR, NIGHTLY_PURGE_MINUTE
        );

        let running = Arc::new(AtomicBool::new(false));

        loop {
            tokio::time::sleep(until_next_daily(NIGHTLY_PURGE_HOUR, NIGHTLY_PURGE_MINUTE)).await;

            let quotes = Arc::clone(&self.quotes);
            let limiter = Arc::clone(&self.limiter);
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                if !claim(&running) {
                    debug!("Nightly purge still running, skipping tick");
                    return;
                }
                quotes.purge_and_rewarm().await;
                let swept = limiter.sweep();
                info!(swept, "Nightly purge finished");
                release(&running);
            });
        }
    }
}

/// Try to mark a job as running. False when a run is already in
/// progress.
fn claim(running: &AtomicBool) -> bool {
    !running.swap(true, Ordering::SeqCst)
}

fn release(running: &AtomicBool) {
    running.store(false, Ordering::SeqCst);
}

/// Time until the next wall-clock `:minute` of any hour.
fn until_next_hour_mark(minute: u32) -> Duration {
    let now = Utc::now();
    let this_hour = now
        .with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let next = if this_hour > now {
        this_hour
    } else {
        this_hour + chrono::Duration::hours(1)
    };

    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}

/// Time until the next wall-clock `hour:minute` (UTC).
fn until_next_daily(hour: u32, minute: u32) -> Duration {
    let now = Utc::now();
    let today = now
        .with_hour(hour)
        .and_then(|t| t.with_minute(minute))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };

    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}
