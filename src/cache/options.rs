//! Response caching configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Default cap on a cacheable response body (64 MiB).
const DEFAULT_MAXIMUM_BODY_SIZE: usize = 64 * 1024 * 1024;

/// How often the store sweeps out expired entries.
const DEFAULT_EXPIRATION_SCAN_FREQUENCY: Duration = Duration::from_secs(60);

/// Lifetime given to public responses that carry no `max-age` or `s-maxage`.
const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Errors produced while loading [`ResponseCachingOptions`].
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid response caching options: {0}")]
    Json(#[from] serde_json::Error),

    #[error("maximum_body_size must be greater than zero")]
    ZeroBodyLimit,
}

/// Settings for [`ResponseCachingMiddleware`](super::ResponseCachingMiddleware).
///
/// | Setting                    | Default  |
/// |----------------------------|----------|
/// | `maximum_body_size`        | 64 MiB   |
/// | `default_ttl_secs`         | 10       |
/// | `use_case_sensitive_paths` | `false`  |
/// | `expiration_scan_frequency_secs` | 60 |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use respcache::cache::ResponseCachingOptions;
///
/// let options = ResponseCachingOptions::from_json(r#"{ "default_ttl_secs": 30 }"#).unwrap();
/// assert_eq!(options.default_ttl(), Duration::from_secs(30));
///
/// let options = ResponseCachingOptions::new().with_case_sensitive_paths(true);
/// assert!(options.case_sensitive_paths());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseCachingOptions {
    maximum_body_size: usize,
    #[serde(rename = "default_ttl_secs", deserialize_with = "duration_from_secs")]
    default_ttl: Duration,
    use_case_sensitive_paths: bool,
    #[serde(rename = "expiration_scan_frequency_secs", deserialize_with = "duration_from_secs")]
    expiration_scan_frequency: Duration,
}

impl Default for ResponseCachingOptions {
    fn default() -> Self {
        Self {
            maximum_body_size: DEFAULT_MAXIMUM_BODY_SIZE,
            default_ttl: DEFAULT_TTL,
            use_case_sensitive_paths: false,
            expiration_scan_frequency: DEFAULT_EXPIRATION_SCAN_FREQUENCY,
        }
    }
}

impl ResponseCachingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from a JSON object; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// [`OptionsError::Json`] for malformed JSON or unknown fields,
    /// [`OptionsError::ZeroBodyLimit`] when `maximum_body_size` is 0.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        if options.maximum_body_size == 0 {
            return Err(OptionsError::ZeroBodyLimit);
        }
        Ok(options)
    }

    /// Largest body, in bytes, that will be stored.
    #[must_use]
    pub fn with_maximum_body_size(mut self, bytes: usize) -> Self {
        self.maximum_body_size = bytes.max(1);
        self
    }

    /// Lifetime for public responses without `max-age`/`s-maxage`.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Treat `/Page` and `/page` as different cache keys.
    #[must_use]
    pub fn with_case_sensitive_paths(mut self, enabled: bool) -> Self {
        self.use_case_sensitive_paths = enabled;
        self
    }

    /// Minimum time between sweeps of expired entries.
    #[must_use]
    pub fn with_expiration_scan_frequency(mut self, frequency: Duration) -> Self {
        self.expiration_scan_frequency = frequency;
        self
    }

    pub fn maximum_body_size(&self) -> usize {
        self.maximum_body_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn case_sensitive_paths(&self) -> bool {
        self.use_case_sensitive_paths
    }

    pub fn expiration_scan_frequency(&self) -> Duration {
        self.expiration_scan_frequency
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
