//! Monotonic elapsed-time reference for the control loop.

use tokio::time::{Duration, Instant};

/// Captured once when the loop starts; never reset.
#[derive(Debug, Clone, Copy)]
pub struct ElapsedClock {
    start: Instant,
}

impl ElapsedClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Whole milliseconds since start
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_ms_tracks_time() {
        let clock = ElapsedClock::start();
        assert_eq!(clock.elapsed_ms(), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(clock.elapsed_ms(), 1500);

        tokio::time::advance(Duration::from_micros(999)).await;
        assert_eq!(clock.elapsed_ms(), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_at_is_fixed() {
        let clock = ElapsedClock::start();
        let start = clock.started_at();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.started_at(), start);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }
}
