//! Courtesy request throttle.
//!
//! Spaces consecutive requests by a minimum delay and inserts a longer pause
//! after every N requests. Shared by every collection in a run, so concurrent
//! cycles draw from the same budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

/// Throttle configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum spacing between two requests.
    pub min_delay: Duration,
    /// Pause after this many requests (0 disables the pause).
    pub pause_every: u64,
    /// Length of the periodic pause.
    pub pause: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::ZERO,
            pause_every: 30,
            pause: Duration::from_secs(10),
        }
    }
}

impl ThrottleConfig {
    /// No delays at all.
    pub fn disabled() -> Self {
        Self {
            min_delay: Duration::ZERO,
            pause_every: 0,
            pause: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_request: Option<Instant>,
    total_requests: u64,
}

/// Shared request throttle. Cloning shares state.
#[derive(Debug, Clone)]
pub struct RequestThrottle {
    config: ThrottleConfig,
    state: Arc<Mutex<ThrottleState>>,
}

impl RequestThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    /// Compute how long the next request must wait and record it as started.
    async fn reserve(&self) -> Duration {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let mut wait = match state.last_request {
            Some(last) => {
                let ready_at = last + self.config.min_delay;
                ready_at.saturating_duration_since(now)
            }
            None => Duration::ZERO,
        };

        state.total_requests += 1;
        if self.config.pause_every > 0
            && state.total_requests > 1
            && (state.total_requests - 1) % self.config.pause_every == 0
        {
            info!(
                "Pausing {:?} after {} requests",
                self.config.pause,
                state.total_requests - 1
            );
            wait += self.config.pause;
        }

        state.last_request = Some(now + wait);
        wait
    }

    /// Wait until the next request may be sent.
    pub async fn acquire(&self) {
        let wait = self.reserve().await;
        if wait > Duration::ZERO {
            debug!("Throttling: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests admitted so far.
    pub async fn total_requests(&self) -> u64 {
        self.state.lock().await.total_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let throttle = RequestThrottle::new(ThrottleConfig {
            min_delay: Duration::from_millis(100),
            pause_every: 0,
            pause: Duration::ZERO,
        });
        assert_eq!(throttle.reserve().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_min_delay_between_requests() {
        let throttle = RequestThrottle::new(ThrottleConfig {
            min_delay: Duration::from_millis(100),
            pause_every: 0,
            pause: Duration::ZERO,
        });
        throttle.reserve().await;
        let wait = throttle.reserve().await;
        assert!(wait > Duration::from_millis(90));
        assert!(wait <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pause_every_n_requests() {
        let throttle = RequestThrottle::new(ThrottleConfig {
            min_delay: Duration::ZERO,
            pause_every: 3,
            pause: Duration::from_secs(5),
        });
        for _ in 0..3 {
            assert_eq!(throttle.reserve().await, Duration::ZERO);
        }
        // Fourth request follows three completed ones.
        assert!(throttle.reserve().await >= Duration::from_secs(4));
        assert_eq!(throttle.total_requests().await, 4);
    }

    #[tokio::test]
    async fn test_disabled_never_waits() {
        let throttle = RequestThrottle::new(ThrottleConfig::disabled());
        for _ in 0..50 {
            assert_eq!(throttle.reserve().await, Duration::ZERO);
        }
    }
}
