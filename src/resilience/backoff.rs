//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry `attempt` (1-based): `base_ms * 2^(attempt-1)`, capped at
/// `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(calculate_backoff(0, 10, 200), Duration::ZERO);

        let first = calculate_backoff(1, 10, 200).as_millis();
        assert!((10..11).contains(&first));

        let third = calculate_backoff(3, 10, 200).as_millis();
        assert!((40..44).contains(&third));

        let capped = calculate_backoff(20, 10, 200).as_millis();
        assert!((200..220).contains(&capped));
    }
}
