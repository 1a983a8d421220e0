//! Sliding-window rate limiter for the voice pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use teloxide::types::UserId;
use tokio::time::Instant;
use tracing::debug;

/// Allows at most `limit` requests per user in any window of length `window`.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    /// Accepted request instants per user, oldest first.
    entries: Mutex<HashMap<UserId, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allow(&self, user: UserId) -> bool {
        self.allow_at(user, Instant::now())
    }

    /// Check and record in one step. A denied request is not recorded.
    pub fn allow_at(&self, user: UserId, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let instants = entries.entry(user).or_default();

        while let Some(&oldest) = instants.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                instants.pop_front();
            } else {
                break;
            }
        }

        if instants.len() < self.limit {
            instants.push_back(now);
            true
        } else {
            debug!("Rate limit hit for user {} ({} in window)", user, instants.len());
            false
        }
    }

    /// How long until `user` may be allowed again. Zero if allowed now.
    pub fn retry_after(&self, user: UserId) -> Duration {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(instants) = entries.get(&user) else {
            return Duration::ZERO;
        };
        let live = instants
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count();
        if live < self.limit {
            return Duration::ZERO;
        }
        // The slot frees up when the oldest live instant leaves the window
        instants
            .iter()
            .find(|&&t| now.saturating_duration_since(t) < self.window)
            .map(|&t| self.window.saturating_sub(now.saturating_duration_since(t)))
            .unwrap_or(Duration::ZERO)
    }

    /// Drop users with nothing left in the window.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, instants| {
            instants
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < self.window)
        });
        before - entries.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const USER: UserId = UserId(1);

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for i in 0..5 {
            assert!(limiter.allow_at(USER, start + Duration::from_secs(i)), "request {i}");
        }
        assert!(!limiter.allow_at(USER, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.allow_at(USER, start));
        assert!(limiter.allow_at(USER, start + Duration::from_secs(30)));
        assert!(!limiter.allow_at(USER, start + Duration::from_secs(59)));
        // First request leaves the window at 60s; second is still live
        assert!(limiter.allow_at(USER, start + Duration::from_secs(60)));
        assert!(!limiter.allow_at(USER, start + Duration::from_secs(61)));
        assert!(limiter.allow_at(USER, start + Duration::from_secs(90)));
    }

    #[test]
    fn test_denied_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.allow_at(USER, start));
        // Hammering while denied must not extend the lockout
        for s in 1..10 {
            assert!(!limiter.allow_at(USER, start + Duration::from_secs(s)));
        }
        assert!(limiter.allow_at(USER, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.allow_at(UserId(1), now));
        assert!(limiter.allow_at(UserId(2), now));
        assert!(!limiter.allow_at(UserId(1), now));
    }

    #[test]
    fn test_never_more_than_limit_in_any_window() {
        let limit = 3;
        let window = Duration::from_secs(10);
        let limiter = RateLimiter::new(limit, window);
        let start = Instant::now();

        // Irregular arrivals, some bunched, some spread out
        let offsets_ms: Vec<u64> = (0..200).map(|i| (i * 7919 % 1000) + i * 450).collect();
        let mut accepted = Vec::new();
        let mut sorted = offsets_ms.clone();
        sorted.sort_unstable();
        for ms in sorted {
            let at = start + Duration::from_millis(ms);
            if limiter.allow_at(USER, at) {
                accepted.push(at);
            }
        }

        assert!(!accepted.is_empty());
        for (i, &t) in accepted.iter().enumerate() {
            let in_window = accepted[i..].iter().take_while(|&&u| u - t < window).count();
            assert!(in_window <= limit, "{in_window} accepted within one window");
        }
    }

    #[test]
    fn test_purge_idle() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();
        limiter.allow_at(UserId(1), start);
        limiter.allow_at(UserId(2), start + Duration::from_secs(50));
        assert_eq!(limiter.tracked_users(), 2);

        assert_eq!(limiter.purge_idle_at(start + Duration::from_secs(70)), 1);
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_counts_down() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert_eq!(limiter.retry_after(USER), Duration::ZERO);
        assert!(limiter.allow(USER));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.retry_after(USER), Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(limiter.retry_after(USER), Duration::ZERO);
        assert!(limiter.allow(USER));
    }

    #[tokio::test]
    async fn test_concurrent_requests_respect_limit() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.allow(USER) })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
