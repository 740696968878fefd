use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum gap between navigation starts across all workers.
/// The lock is held through the wait, so callers are served one at a time.
pub struct NavLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl NavLimiter {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval: Duration::from_millis(min_interval_ms),
            last: Mutex::new(None),
        }
    }

    pub async fn wait_turn(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.min_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_turn_is_immediate() {
        let limiter = NavLimiter::new(650);
        let start = Instant::now();
        limiter.wait_turn().await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_turns_are_spaced() {
        let limiter = Arc::new(NavLimiter::new(650));
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.wait_turn().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();
        assert!(stamps[1] - stamps[0] >= Duration::from_millis(650));
        assert!(stamps[2] - stamps[1] >= Duration::from_millis(650));
        assert!(start.elapsed() >= Duration::from_millis(1300));
    }
}
