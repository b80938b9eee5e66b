//! Per-device fixed-window rate limiting.
//!
//! Each device gets `limit` requests per window. The window opens on the
//! first request after the previous one expired and counts from there; it
//! does not slide. State is in-memory only and resets on restart.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter keyed by device id.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    /// Record one request for `device_id`; `false` means reject.
    pub fn check(&self, device_id: &str) -> bool {
        self.check_at(device_id, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    ///
    /// The map entry is held for the whole read-modify-write, so concurrent
    /// requests for one device cannot both take the last slot.
    pub fn check_at(&self, device_id: &str, now: Instant) -> bool {
        let mut entry = self
            .windows
            .entry(device_id.to_string())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.window,
            });

        let window = entry.value_mut();
        if now >= window.reset_at {
            *window = Window {
                count: 1,
                reset_at: now + self.window,
            };
            return true;
        }
        if window.count >= self.limit {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop windows that have expired. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    /// [`prune`](Self::prune) against an explicit clock reading.
    fn prune_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, w| {
            let keep = w.reset_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sixty_first_request_rejected() {
        let limiter = RateLimiter::new(60, Duration::from_secs(60));
        let t0 = Instant::now();

        for i in 0..60 {
            assert!(limiter.check_at("dev", t0 + Duration::from_millis(i)), "request {i}");
        }
        assert!(!limiter.check_at("dev", t0 + Duration::from_secs(1)));
        assert!(!limiter.check_at("dev", t0 + Duration::from_secs(59)));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("dev", t0));
        assert!(limiter.check_at("dev", t0));
        assert!(!limiter.check_at("dev", t0));

        let later = t0 + Duration::from_secs(60);
        assert!(limiter.check_at("dev", later));
        assert!(limiter.check_at("dev", later));
        assert!(!limiter.check_at("dev", later));
    }

    #[test]
    fn test_devices_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("a", t0));
        assert!(!limiter.check_at("a", t0));
        assert!(limiter.check_at("b", t0));
        assert_eq!(limiter.windows.len(), 2);
    }

    #[test]
    fn test_prune_drops_expired_windows() {
        let limiter = RateLimiter::new(5, Duration::from_millis(1));
        limiter.check("dev");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(limiter.prune(), 1);
        assert!(limiter.windows.is_empty());
    }

    #[test]
    fn test_prune_keeps_live_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.check_at("old", t0);
        limiter.check_at("fresh", t0 + Duration::from_secs(30));

        assert_eq!(limiter.prune_at(t0 + Duration::from_secs(61)), 1);
        assert!(limiter.windows.contains_key("fresh"));
        assert_eq!(limiter.prune_at(t0 + Duration::from_secs(61)), 0);
    }

    #[test]
    fn test_prune_while_devices_arrive() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));
        let t0 = Instant::now();
        for i in 0..100 {
            limiter.check_at(&format!("stale-{i}"), t0);
        }

        let writer = {
            let limiter = limiter.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    limiter.check_at(&format!("new-{i}"), t0 + Duration::from_secs(120));
                }
            })
        };
        let mut pruned = 0;
        for _ in 0..50 {
            pruned += limiter.prune_at(t0 + Duration::from_secs(90));
        }
        writer.join().unwrap();
        pruned += limiter.prune_at(t0 + Duration::from_secs(90));

        assert_eq!(pruned, 100);
        assert_eq!(limiter.windows.len(), 2000);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new(60, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.check("dev")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 60);
    }
}
