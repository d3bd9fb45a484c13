//! Cache configuration supplied once at startup.

use crate::error::{codes, Error, Result};
use std::time::Duration;

/// Settings for the in-memory store and the cache service.
///
/// Not hot-reloadable: build it once and hand it to
/// [`InMemoryBackend::with_config`](crate::backend::InMemoryBackend::with_config)
/// and [`CacheService::from_config`](crate::CacheService::from_config).
///
/// # Example
///
/// ```
/// use budget_kit::config::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default()
///     .with_size_limit(500)
///     .with_compaction_percentage(0.2)
///     .with_default_expiration(Duration::from_secs(600));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// Maximum total entry size. `None` disables compaction.
    pub size_limit: Option<usize>,

    /// Fraction of the store to compact when the size limit is exceeded.
    pub compaction_percentage: f64,

    /// Minimum interval between two expiration scans.
    pub expiration_scan_frequency: Duration,

    /// TTL applied when `set` is called without one. `None` = no expiry.
    pub default_expiration: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            size_limit: Some(1024),
            compaction_percentage: 0.25,
            expiration_scan_frequency: Duration::from_secs(60),
            default_expiration: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl CacheConfig {
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn without_size_limit(mut self) -> Self {
        self.size_limit = None;
        self
    }

    pub fn with_compaction_percentage(mut self, percentage: f64) -> Self {
        self.compaction_percentage = percentage;
        self
    }

    pub fn with_expiration_scan_frequency(mut self, frequency: Duration) -> Self {
        self.expiration_scan_frequency = frequency;
        self
    }

    pub fn with_default_expiration(mut self, ttl: Duration) -> Self {
        self.default_expiration = Some(ttl);
        self
    }

    pub fn without_default_expiration(mut self) -> Self {
        self.default_expiration = None;
        self
    }

    /// Check the configuration before use.
    ///
    /// # Errors
    ///
    /// Returns a `System` error with code `CONFIG_ERROR` when the compaction
    /// percentage is outside `(0, 1]`, the scan frequency is zero, or the size
    /// limit is zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.compaction_percentage > 0.0 && self.compaction_percentage <= 1.0) {
            return Err(Error::system(
                codes::CONFIG_ERROR,
                format!(
                    "compaction_percentage must be in (0, 1], got {}",
                    self.compaction_percentage
                ),
            ));
        }

        if self.expiration_scan_frequency.is_zero() {
            return Err(Error::system(
                codes::CONFIG_ERROR,
                "expiration_scan_frequency must be greater than zero",
            ));
        }

        if self.size_limit == Some(0) {
            return Err(Error::system(
                codes::CONFIG_ERROR,
                "size_limit must be greater than zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_compaction_percentage() {
        let err = CacheConfig::default()
            .with_compaction_percentage(1.5)
            .validate()
            .expect_err("1.5 is out of range");
        assert_eq!(err.code(), codes::CONFIG_ERROR);

        assert!(CacheConfig::default()
            .with_compaction_percentage(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_scan_frequency_rejected() {
        assert!(CacheConfig::default()
            .with_expiration_scan_frequency(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_size_limit_rejected() {
        assert!(CacheConfig::default().with_size_limit(0).validate().is_err());
        assert!(CacheConfig::default().without_size_limit().validate().is_ok());
    }
}
