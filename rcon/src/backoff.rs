//! Reconnect backoff (§4.2): `min(reconnectDelay × 2^attempt, 60s)` with
//! ±10% jitter, using `rand` as the jitter source.

use rand::Rng;
use std::time::Duration;

const MAX_DELAY: Duration = Duration::from_secs(60);

/// `attempt` is 0-based (the delay before the *first* reconnect try).
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let scaled = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX).max(1));
    let capped = scaled.min(MAX_DELAY);
    jitter(capped)
}

fn jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let factor = rng.random_range(0.9..=1.1);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_max_delay() {
        let base = Duration::from_secs(5);
        let delay = reconnect_delay(base, 10);
        assert!(delay.as_secs_f64() <= MAX_DELAY.as_secs_f64() * 1.1);
    }

    #[test]
    fn grows_exponentially_before_the_cap() {
        let base = Duration::from_millis(500);
        let d0 = reconnect_delay(base, 0);
        let d2 = reconnect_delay(base, 2);
        // Even with jitter, four quantization steps keep d2 well above d0.
        assert!(d2.as_secs_f64() > d0.as_secs_f64());
    }
}
