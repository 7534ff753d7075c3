//! Per-IP sliding-window request tracking.
//!
//! Each IP keeps an ordered sequence of request timestamps bounded to the
//! last hour. Counts over the moving one-minute and one-hour windows feed
//! the rate-abuse detector; a true sliding window means bursts spanning
//! bucket boundaries are still caught.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Counts observed for one IP at one instant
#[derive(Debug, Clone, Copy)]
pub struct RateSample {
    /// Requests within the last 60 seconds, including this one
    pub per_minute: u32,
    /// Requests within the last hour, including this one
    pub per_hour: u32,
}

/// Sliding-window counters of request timestamps, keyed by IP
pub struct RequestTracker {
    windows: RwLock<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Record one request for `ip` at `now` and return the window counts.
    ///
    /// Timestamps older than one hour are pruned lazily on access. Counts
    /// scan the whole window, so callers may replay timestamps out of
    /// order without undercounting.
    pub async fn record(&self, ip: &str, now: DateTime<Utc>) -> RateSample {
        let hour_ago = now - Duration::hours(1);
        let minute_ago = now - Duration::seconds(60);

        let mut windows = self.windows.write().await;
        let window = windows.entry(ip.to_string()).or_default();

        while window.front().is_some_and(|t| *t < hour_ago) {
            window.pop_front();
        }
        window.push_back(now);

        let per_hour = window.iter().filter(|t| **t >= hour_ago).count() as u32;
        let per_minute = window.iter().filter(|t| **t >= minute_ago).count() as u32;

        RateSample {
            per_minute,
            per_hour,
        }
    }

    /// Window counts for `ip` without recording a request
    pub async fn peek(&self, ip: &str, now: DateTime<Utc>) -> RateSample {
        let hour_ago = now - Duration::hours(1);
        let minute_ago = now - Duration::seconds(60);

        let windows = self.windows.read().await;
        let Some(window) = windows.get(ip) else {
            return RateSample {
                per_minute: 0,
                per_hour: 0,
            };
        };
        let per_hour = window.iter().filter(|t| **t >= hour_ago).count() as u32;
        let per_minute = window.iter().filter(|t| **t >= minute_ago).count() as u32;
        RateSample {
            per_minute,
            per_hour,
        }
    }

    /// Number of IPs with at least one timestamp still retained
    pub async fn active_ips(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Drop windows with no activity inside the last hour.
    ///
    /// Returns the number of IPs reclaimed.
    pub async fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let hour_ago = now - Duration::hours(1);
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, window| window.back().is_some_and(|t| *t >= hour_ago));
        before - windows.len()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_both_windows() {
        let tracker = RequestTracker::new();
        let start = Utc::now();

        // Two requests 30 minutes ago, three now
        tracker.record("10.0.0.1", start - Duration::minutes(30)).await;
        tracker.record("10.0.0.1", start - Duration::minutes(30)).await;
        tracker.record("10.0.0.1", start).await;
        tracker.record("10.0.0.1", start).await;
        let sample = tracker.record("10.0.0.1", start).await;

        assert_eq!(sample.per_minute, 3);
        assert_eq!(sample.per_hour, 5);
    }

    #[tokio::test]
    async fn minute_window_never_exceeds_hour_window() {
        let tracker = RequestTracker::new();
        let start = Utc::now();

        for i in 0..200 {
            let at = start + Duration::seconds(i);
            let sample = tracker.record("10.0.0.2", at).await;
            assert!(sample.per_minute <= sample.per_hour);
        }
    }

    #[tokio::test]
    async fn old_entries_are_pruned_on_access() {
        let tracker = RequestTracker::new();
        let start = Utc::now();

        tracker.record("10.0.0.3", start - Duration::minutes(90)).await;
        let sample = tracker.record("10.0.0.3", start).await;

        assert_eq!(sample.per_hour, 1);
    }

    #[tokio::test]
    async fn out_of_order_timestamps_count_correctly() {
        let tracker = RequestTracker::new();
        let start = Utc::now();

        // A late-arriving timestamp lands between two current ones
        tracker.record("10.0.0.6", start).await;
        tracker.record("10.0.0.6", start - Duration::minutes(30)).await;
        let sample = tracker.record("10.0.0.6", start).await;

        assert_eq!(sample.per_minute, 2);
        assert_eq!(sample.per_hour, 3);

        let peeked = tracker.peek("10.0.0.6", start).await;
        assert_eq!(peeked.per_minute, 2);
        assert_eq!(peeked.per_hour, 3);
    }

    #[tokio::test]
    async fn idle_ips_are_reclaimed() {
        let tracker = RequestTracker::new();
        let start = Utc::now();

        tracker.record("10.0.0.4", start - Duration::minutes(90)).await;
        tracker.record("10.0.0.5", start).await;
        assert_eq!(tracker.active_ips().await, 2);

        let removed = tracker.prune_idle(start).await;
        assert_eq!(removed, 1);
        assert_eq!(tracker.active_ips().await, 1);
    }
}
