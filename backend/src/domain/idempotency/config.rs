//! Retention window for scan receipts.

use std::time::Duration;

/// How long scan receipts remain eligible for replay.
///
/// A retried scan older than the TTL is treated as a new physical scan.
///
/// # Example
///
/// ```
/// # use loyalty_backend::domain::idempotency::IdempotencyConfig;
/// # use std::time::Duration;
/// let config = IdempotencyConfig::default();
/// assert_eq!(config.ttl(), Duration::from_secs(24 * 3600));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyConfig {
    ttl: Duration,
}

impl IdempotencyConfig {
    const DEFAULT_TTL_HOURS: u64 = 24;
    const MIN_TTL_HOURS: u64 = 1;
    // One week; receipts only need to outlive terminal retry windows.
    const MAX_TTL_HOURS: u64 = 24 * 7;

    /// Build a configuration from an hour count, clamped to the allowed range.
    pub fn with_ttl_hours(hours: u64) -> Self {
        let hours = hours.clamp(Self::MIN_TTL_HOURS, Self::MAX_TTL_HOURS);
        Self {
            ttl: Duration::from_secs(hours.saturating_mul(3600)),
        }
    }

    /// Create with an explicit TTL, bypassing clamping (for tests).
    pub const fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Returns the configured TTL.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the TTL as a `chrono` duration for timestamp arithmetic.
    pub fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self::with_ttl_hours(Self::DEFAULT_TTL_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(6, 6)]
    #[case(0, 1)]
    #[case(168, 168)]
    #[case(10_000, 168)]
    fn ttl_hours_are_clamped(#[case] requested: u64, #[case] hours: u64) {
        let config = IdempotencyConfig::with_ttl_hours(requested);
        assert_eq!(config.ttl(), Duration::from_secs(hours * 3600));
    }

    #[rstest]
    fn default_keeps_receipts_for_a_day() {
        let config = IdempotencyConfig::default();
        assert_eq!(config.chrono_ttl(), chrono::Duration::hours(24));
    }

    #[rstest]
    fn explicit_ttl_skips_clamping() {
        let config = IdempotencyConfig::with_ttl(Duration::from_secs(5));
        assert_eq!(config.chrono_ttl(), chrono::Duration::seconds(5));
    }
}
