//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based; 0 means the first try and never waits).
///
/// `base * factor^(attempt-1)`, capped at `max`, plus uniform jitter in
/// `[0, jitter_ratio * delay]`.
pub fn calculate_backoff(
    attempt: u32,
    base: Duration,
    factor: f64,
    max: Duration,
    jitter_ratio: f64,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let scaled = base.as_secs_f64() * factor.max(1.0).powi(exponent);
    let capped = scaled.min(max.as_secs_f64());

    let jitter_range = capped * jitter_ratio.clamp(0.0, 1.0);
    let jitter = if jitter_range > 0.0 {
        rand::rng().random_range(0.0..=jitter_range)
    } else {
        0.0
    };

    Duration::from_secs_f64(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_secs(2);

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, BASE, 2.0, MAX, 0.1), Duration::ZERO);

        let b1 = calculate_backoff(1, BASE, 2.0, MAX, 0.1);
        assert!(b1 >= Duration::from_millis(100) && b1 <= Duration::from_millis(110));

        let b2 = calculate_backoff(2, BASE, 2.0, MAX, 0.1);
        assert!(b2 >= Duration::from_millis(200) && b2 <= Duration::from_millis(220));

        let capped = calculate_backoff(10, BASE, 2.0, MAX, 0.1);
        assert!(capped >= MAX && capped <= MAX + Duration::from_millis(200));
    }

    #[test]
    fn test_delays_strictly_increase_within_jitter() {
        for _ in 0..50 {
            let delays: Vec<_> = (1..=4)
                .map(|n| calculate_backoff(n, Duration::from_secs(1), 2.0, Duration::from_secs(60), 0.1))
                .collect();
            assert!(delays.windows(2).all(|w| w[0] < w[1]), "{:?}", delays);
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let d = calculate_backoff(3, BASE, 2.0, MAX, 0.0);
        assert_eq!(d, Duration::from_millis(400));
    }
}
