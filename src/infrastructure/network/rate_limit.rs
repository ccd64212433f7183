use crate::domain::error::RegistryError;
use crate::infrastructure::config::RateLimitMode;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Rolling-window admission control for remote calls.
///
/// Every admitted request records its timestamp; a slot is free again once
/// that timestamp falls out of the trailing window. No more than
/// `max_per_window` timestamps are ever inside the window.
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    mode: RateLimitMode,
    slots: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32, mode: RateLimitMode) -> Result<Self, RegistryError> {
        Self::with_window(max_per_minute, WINDOW, mode)
    }

    pub fn with_window(
        max_per_window: u32,
        window: Duration,
        mode: RateLimitMode,
    ) -> Result<Self, RegistryError> {
        if max_per_window == 0 {
            return Err(RegistryError::Config(
                "rate limit budget must be greater than 0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(RegistryError::Config(
                "rate limit window must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            max_per_window: max_per_window as usize,
            window,
            mode,
            slots: Mutex::new(VecDeque::with_capacity(max_per_window as usize)),
        })
    }

    /// Admits one request according to the configured mode.
    pub async fn admit(&self) -> Result<(), RegistryError> {
        match self.mode {
            RateLimitMode::Suspend => {
                self.acquire().await;
                Ok(())
            }
            RateLimitMode::FailFast => self.try_acquire(),
        }
    }

    /// Suspends until a slot is free, then records it.
    pub async fn acquire(&self) {
        loop {
            let wake_at = match self.try_record(Instant::now()) {
                Ok(()) => return,
                Err(wake_at) => wake_at,
            };
            debug!(
                "Rate limit reached, waiting {:.1}s",
                wake_at.saturating_duration_since(Instant::now()).as_secs_f64()
            );
            tokio::time::sleep_until(wake_at).await;
        }
    }

    pub fn try_acquire(&self) -> Result<(), RegistryError> {
        self.try_record(Instant::now()).map_err(|wake_at| {
            RegistryError::RateLimitExceeded(format!(
                "{} requests per {}s used, next slot in {}ms",
                self.max_per_window,
                self.window.as_secs(),
                wake_at.saturating_duration_since(Instant::now()).as_millis()
            ))
        })
    }

    /// Slots currently consumed inside the trailing window.
    pub fn in_window(&self) -> usize {
        let mut slots = self.slots.lock();
        Self::evict(&mut slots, Instant::now(), self.window);
        slots.len()
    }

    // Ok when recorded, Err(instant the oldest slot expires) otherwise
    fn try_record(&self, now: Instant) -> Result<(), Instant> {
        let mut slots = self.slots.lock();
        Self::evict(&mut slots, now, self.window);
        if slots.len() < self.max_per_window {
            slots.push_back(now);
            return Ok(());
        }
        match slots.front() {
            Some(oldest) => Err(*oldest + self.window),
            None => Err(now + self.window),
        }
    }

    fn evict(slots: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = slots.front() {
            if now.saturating_duration_since(*oldest) >= window {
                slots.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn zero_budget_is_misconfiguration() {
        let err = RateLimiter::new(0, RateLimitMode::Suspend).err().unwrap();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn admits_budget_then_waits_for_window() {
        let limiter = RateLimiter::new(3, RateLimitMode::Suspend).unwrap();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        assert!(start.elapsed() >= WINDOW);
        assert!(start.elapsed() < WINDOW + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn window_never_exceeds_budget() {
        let limiter = Arc::new(RateLimiter::new(5, RateLimitMode::Suspend).unwrap());
        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut admitted = Vec::new();
        for h in handles {
            admitted.push(h.await.unwrap());
        }
        admitted.sort();

        // any 60s window holds at most 5 admissions
        for (i, t) in admitted.iter().enumerate() {
            let inside = admitted[i..]
                .iter()
                .filter(|other| other.duration_since(*t) < WINDOW)
                .count();
            assert!(inside <= 5, "{} admissions inside one window", inside);
        }
        // and demand is served at full budget: first 5 at once
        let first = admitted[0];
        assert_eq!(
            admitted.iter().filter(|t| t.duration_since(first) < WINDOW).count(),
            5
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_reports_backpressure() {
        let limiter = RateLimiter::new(2, RateLimitMode::FailFast).unwrap();
        limiter.admit().await.unwrap();
        limiter.admit().await.unwrap();
        let err = limiter.admit().await.unwrap_err();
        assert!(matches!(err, RegistryError::RateLimitExceeded(_)));

        tokio::time::advance(WINDOW).await;
        assert!(limiter.admit().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn slots_expire_individually() {
        let limiter = RateLimiter::new(2, RateLimitMode::FailFast).unwrap();
        limiter.try_acquire().unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.try_acquire().unwrap();
        assert_eq!(limiter.in_window(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.in_window(), 1);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }
}
