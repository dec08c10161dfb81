//! # Per-identity sliding-window rate limiting
//!
//! Each identity (case-insensitive name + contact) may perform at most
//! `max_actions` accepted actions within any trailing `window`. History lives
//! in a single map behind one mutex: admission checks and the periodic sweep
//! both take it for the whole of their read-check-write, so concurrent callers
//! on the same identity can never be admitted past the limit.
//!
//! The sweep keeps timestamps for `retention`, which is never shorter than the
//! admission window, so an entry is not evicted while it can still count
//! toward a decision.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use domains::IdentityKey;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};

/// Errors returned when a [`RateLimitPolicy`] is constructed with unusable values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitPolicyError {
    #[error("max_actions must be greater than 0")]
    ZeroMaxActions,

    #[error("window must be greater than 0")]
    ZeroWindow,

    #[error("retention ({retention:?}) must not be shorter than the window ({window:?})")]
    RetentionShorterThanWindow { retention: Duration, window: Duration },

    #[error("sweep interval must be greater than 0")]
    ZeroSweepInterval,
}

/// Limits and housekeeping cadence for [`SlidingWindowLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_actions: usize,
    window: Duration,
    retention: Duration,
    sweep_interval: Duration,
}

impl RateLimitPolicy {
    pub const DEFAULT_MAX_ACTIONS: usize = 2;
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(2 * 60);
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    pub fn new(
        max_actions: usize,
        window: Duration,
        retention: Duration,
        sweep_interval: Duration,
    ) -> Result<Self, RateLimitPolicyError> {
        if max_actions == 0 {
            return Err(RateLimitPolicyError::ZeroMaxActions);
        }
        if window.is_zero() {
            return Err(RateLimitPolicyError::ZeroWindow);
        }
        if retention < window {
            return Err(RateLimitPolicyError::RetentionShorterThanWindow { retention, window });
        }
        if sweep_interval.is_zero() {
            return Err(RateLimitPolicyError::ZeroSweepInterval);
        }
        Ok(Self {
            max_actions,
            window,
            retention,
            sweep_interval,
        })
    }

    pub fn max_actions(&self) -> usize {
        self.max_actions
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_actions: Self::DEFAULT_MAX_ACTIONS,
            window: Self::DEFAULT_WINDOW,
            retention: Self::DEFAULT_RETENTION,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub pruned_timestamps: usize,
    pub removed_identities: usize,
    pub remaining_identities: usize,
}

/// In-memory, single-process sliding-window limiter keyed by [`IdentityKey`].
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<IdentityKey, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    // A panic while holding the lock cannot leave a half-written entry behind
    // (every mutation is a single insert/retain), so poisoning is ignored.
    fn records(&self) -> MutexGuard<'_, HashMap<IdentityKey, Vec<Instant>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an action for `(name, contact)` if the identity is under its limit.
    ///
    /// Returns `false` without touching any state when the identity already has
    /// `max_actions` accepted actions inside the trailing window.
    pub fn try_admit(&self, name: &str, contact: &str) -> bool {
        let key = IdentityKey::new(name, contact);
        let mut records = self.records();
        let now = self.clock.now();

        let mut recent: Vec<Instant> = records
            .get(&key)
            .map(|stamps| {
                stamps
                    .iter()
                    .copied()
                    .filter(|stamp| within(now, *stamp, self.policy.window))
                    .collect()
            })
            .unwrap_or_default();

        if recent.len() >= self.policy.max_actions {
            debug!(identity = %key, recent = recent.len(), "rate limit reached");
            return false;
        }

        recent.push(now);
        debug!(identity = %key, recent = recent.len(), "action admitted");
        records.insert(key, recent);
        true
    }

    /// Accepted actions of `(name, contact)` still inside the window. Read-only.
    pub fn recent_actions(&self, name: &str, contact: &str) -> usize {
        let key = IdentityKey::new(name, contact);
        let records = self.records();
        let now = self.clock.now();
        records.get(&key).map_or(0, |stamps| {
            stamps
                .iter()
                .filter(|stamp| within(now, **stamp, self.policy.window))
                .count()
        })
    }

    /// Number of identities currently holding any history.
    pub fn tracked_identities(&self) -> usize {
        self.records().len()
    }

    /// Drops timestamps older than the retention horizon and forgets identities
    /// left without any.
    pub fn sweep(&self) -> SweepReport {
        let mut records = self.records();
        let now = self.clock.now();
        let retention = self.policy.retention;
        let mut report = SweepReport::default();

        records.retain(|_, stamps| {
            let before = stamps.len();
            stamps.retain(|stamp| within(now, *stamp, retention));
            report.pruned_timestamps += before - stamps.len();
            if stamps.is_empty() {
                report.removed_identities += 1;
                false
            } else {
                true
            }
        });
        report.remaining_identities = records.len();
        report
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval` until `shutdown`
    /// flips to `true` or its sender is dropped.
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = self.policy.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.sweep();
                        if report.removed_identities > 0 {
                            info!(
                                pruned = report.pruned_timestamps,
                                removed = report.removed_identities,
                                remaining = report.remaining_identities,
                                "rate limit sweep"
                            );
                        } else {
                            debug!(remaining = report.remaining_identities, "rate limit sweep");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("rate limit sweeper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn within(now: Instant, stamp: Instant, span: Duration) -> bool {
    now.saturating_duration_since(stamp) < span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn limiter() -> (SlidingWindowLimiter, ManualClock) {
        let clock = ManualClock::default();
        let limiter = SlidingWindowLimiter::with_clock(RateLimitPolicy::default(), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn third_action_in_window_is_denied() {
        let (limiter, clock) = limiter();

        assert!(limiter.try_admit("alice", "a@x.com"));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.try_admit("alice", "a@x.com"));
        clock.advance(Duration::from_secs(10));
        assert!(!limiter.try_admit("alice", "a@x.com"));
    }

    #[test]
    fn admits_again_once_oldest_leaves_window() {
        let (limiter, clock) = limiter();

        assert!(limiter.try_admit("alice", "a@x.com"));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.try_admit("alice", "a@x.com"));

        clock.advance(Duration::from_secs(49));
        assert!(!limiter.try_admit("alice", "a@x.com"));

        // 60s after the first action
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_admit("alice", "a@x.com"));
        assert!(!limiter.try_admit("alice", "a@x.com"));
    }

    #[test]
    fn denial_does_not_record_an_action() {
        let (limiter, _clock) = limiter();

        assert!(limiter.try_admit("bob", "b@x.com"));
        assert!(limiter.try_admit("bob", "b@x.com"));
        for _ in 0..5 {
            assert!(!limiter.try_admit("bob", "b@x.com"));
        }
        assert_eq!(limiter.recent_actions("bob", "b@x.com"), 2);
    }

    #[test]
    fn identity_is_case_insensitive() {
        let (limiter, _clock) = limiter();

        assert!(limiter.try_admit("Alice", "a@x.com"));
        assert!(limiter.try_admit("alice", "A@X.COM"));
        assert!(!limiter.try_admit("ALICE", "a@X.com"));
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn identities_are_limited_independently() {
        let (limiter, _clock) = limiter();

        assert!(limiter.try_admit("alice", "a@x.com"));
        assert!(limiter.try_admit("alice", "a@x.com"));
        assert!(limiter.try_admit("alice", "other@x.com"));
        assert!(limiter.try_admit("carol", "a@x.com"));
        assert_eq!(limiter.tracked_identities(), 3);
    }

    #[test]
    fn concurrent_callers_get_exactly_the_limit() {
        let (limiter, _clock) = limiter();
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                // mixed casing still hits one bucket
                let name = if i % 2 == 0 { "Dave" } else { "dave" };
                thread::spawn(move || limiter.try_admit(name, "d@x.com"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 2);
    }

    #[test]
    fn concurrent_callers_below_limit_are_all_admitted() {
        let policy = RateLimitPolicy::new(
            10,
            Duration::from_secs(60),
            Duration::from_secs(120),
            Duration::from_secs(300),
        )
        .unwrap();
        let limiter = Arc::new(SlidingWindowLimiter::with_clock(policy, Arc::new(ManualClock::default())));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || limiter.try_admit("erin", "e@x.com"))
            })
            .collect();

        assert!(handles.into_iter().all(|h| h.join().unwrap()));
        assert_eq!(limiter.recent_actions("erin", "e@x.com"), 4);
    }

    #[test]
    fn sweep_keeps_entries_younger_than_retention() {
        let (limiter, clock) = limiter();
        assert!(limiter.try_admit("alice", "a@x.com"));

        // outside the admission window but inside retention
        clock.advance(Duration::from_secs(90));
        let report = limiter.sweep();
        assert_eq!(report.pruned_timestamps, 0);
        assert_eq!(report.removed_identities, 0);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn sweep_removes_identity_once_all_entries_expire() {
        let (limiter, clock) = limiter();
        assert!(limiter.try_admit("alice", "a@x.com"));
        assert!(limiter.try_admit("alice", "a@x.com"));

        clock.advance(Duration::from_secs(120));
        let report = limiter.sweep();
        assert_eq!(
            report,
            SweepReport {
                pruned_timestamps: 2,
                removed_identities: 1,
                remaining_identities: 0,
            }
        );
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[test]
    fn sweep_prunes_only_old_entries_of_an_identity() {
        let (limiter, clock) = limiter();
        assert!(limiter.try_admit("alice", "a@x.com"));
        clock.advance(Duration::from_secs(50));
        assert!(limiter.try_admit("alice", "a@x.com"));
        assert!(limiter.try_admit("bob", "b@x.com"));

        // first alice entry is 130s old, the rest 80s
        clock.advance(Duration::from_secs(80));
        let report = limiter.sweep();
        assert_eq!(report.pruned_timestamps, 1);
        assert_eq!(report.removed_identities, 0);
        assert_eq!(report.remaining_identities, 2);

        clock.advance(Duration::from_secs(40));
        let report = limiter.sweep();
        assert_eq!(report.pruned_timestamps, 2);
        assert_eq!(report.removed_identities, 2);
    }

    #[test]
    fn sweep_running_alongside_admissions_loses_nothing() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (limiter, clock) = limiter();
        let limiter = Arc::new(limiter);
        let attempts: [usize; 6] = [1, 2, 3, 5, 8, 13];

        // stale history for every identity, so the sweep has work to race with
        for i in 0..attempts.len() {
            let contact = format!("user{i}@x.com");
            assert!(limiter.try_admit("user", &contact));
            assert!(limiter.try_admit("user", &contact));
        }
        clock.advance(Duration::from_secs(130));

        let stop = Arc::new(AtomicBool::new(false));
        let sweeper = {
            let limiter = Arc::clone(&limiter);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut sweeps = 0usize;
                loop {
                    limiter.sweep();
                    sweeps += 1;
                    if stop.load(Ordering::Relaxed) {
                        break sweeps;
                    }
                }
            })
        };

        let workers: Vec<_> = attempts
            .iter()
            .enumerate()
            .flat_map(|(i, &count)| (0..count).map(move |_| i))
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || (i, limiter.try_admit("user", &format!("user{i}@x.com"))))
            })
            .collect();

        let mut admitted = vec![0usize; attempts.len()];
        for worker in workers {
            let (i, ok) = worker.join().unwrap();
            if ok {
                admitted[i] += 1;
            }
        }
        stop.store(true, Ordering::Relaxed);
        assert!(sweeper.join().unwrap() > 0);

        for (i, &count) in attempts.iter().enumerate() {
            let expected = count.min(RateLimitPolicy::DEFAULT_MAX_ACTIONS);
            assert_eq!(admitted[i], expected, "identity {i}");
            assert_eq!(limiter.recent_actions("user", &format!("user{i}@x.com")), expected);
        }

        // a final sweep drops the stale entries but keeps every fresh admission
        limiter.sweep();
        assert_eq!(limiter.tracked_identities(), attempts.len());
    }

    #[test]
    fn policy_rejects_unusable_values() {
        let minute = Duration::from_secs(60);
        assert_eq!(
            RateLimitPolicy::new(0, minute, minute, minute),
            Err(RateLimitPolicyError::ZeroMaxActions)
        );
        assert_eq!(
            RateLimitPolicy::new(2, Duration::ZERO, minute, minute),
            Err(RateLimitPolicyError::ZeroWindow)
        );
        assert_eq!(
            RateLimitPolicy::new(2, minute, Duration::from_secs(30), minute),
            Err(RateLimitPolicyError::RetentionShorterThanWindow {
                retention: Duration::from_secs(30),
                window: minute,
            })
        );
        assert_eq!(
            RateLimitPolicy::new(2, minute, minute, Duration::ZERO),
            Err(RateLimitPolicyError::ZeroSweepInterval)
        );
    }

    #[tokio::test]
    async fn sweeper_task_evicts_and_stops_on_shutdown() {
        let clock = ManualClock::default();
        let policy = RateLimitPolicy::new(
            2,
            Duration::from_secs(60),
            Duration::from_secs(120),
            Duration::from_millis(10),
        )
        .unwrap();
        let limiter = Arc::new(SlidingWindowLimiter::with_clock(policy, Arc::new(clock.clone())));
        assert!(limiter.try_admit("alice", "a@x.com"));

        let (tx, rx) = watch::channel(false);
        let handle = Arc::clone(&limiter).spawn_sweeper(rx);

        clock.advance(Duration::from_secs(180));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.tracked_identities(), 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_when_sender_dropped() {
        let limiter = Arc::new(SlidingWindowLimiter::new(RateLimitPolicy::default()));
        let (tx, rx) = watch::channel(false);
        let handle = limiter.spawn_sweeper(rx);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
