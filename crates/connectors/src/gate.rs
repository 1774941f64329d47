use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Minimum spacing between successive queries on the same manager, so a
/// nightly run never saturates the operational source server.
pub const MIN_QUERY_INTERVAL: Duration = Duration::from_millis(100);

/// Enforces a minimum interval between successive calls. Single-owner:
/// each connection manager carries its own gate.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last: Option<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        RateGate {
            interval,
            last: None,
        }
    }

    /// Sleeps until at least `interval` has passed since the previous
    /// call, then stamps the current instant.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let since = last.elapsed();
            if since < self.interval {
                sleep(self.interval - since).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

impl Default for RateGate {
    fn default() -> Self {
        RateGate::new(MIN_QUERY_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let mut gate = RateGate::new(Duration::from_millis(50));
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn successive_calls_are_spaced() {
        let mut gate = RateGate::default();
        gate.wait().await;
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= MIN_QUERY_INTERVAL);
    }
}
