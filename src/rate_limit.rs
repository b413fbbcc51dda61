//! Rate limiting policy for HTTP 429 responses.
//!
//! When rate-limit control is enabled, a 429 response puts the call into a
//! cooldown after which the whole request is replayed, starting again from
//! token acquisition. The number of replays is bounded.

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Information extracted from rate limit headers of a 429 response.
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    /// When the rate limit resets (from X-RateLimit-Reset or RateLimit-Reset headers).
    pub reset_at: Option<SystemTime>,

    /// How long to wait before retrying (from Retry-After header).
    pub retry_after: Option<Duration>,

    /// Number of requests remaining in the current window.
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts rate limit information from HTTP response headers.
    ///
    /// ```
    /// use inter_sdk_core::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert!(info.retry_after.is_some());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            reset_at: parse_rate_limit_reset(headers),
            retry_after: parse_retry_after(headers),
            remaining: parse_rate_limit_remaining(headers),
        }
    }

    /// Returns the wait the server asked for, if it said anything at all.
    pub fn server_delay(&self) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after);
        }

        self.reset_at
            .and_then(|reset_at| reset_at.duration_since(SystemTime::now()).ok())
    }
}

/// Configuration for the 429 branch of the transport.
///
/// ```
/// use inter_sdk_core::rate_limit::RateLimitConfig;
/// use std::time::Duration;
///
/// let config = RateLimitConfig::builder()
///     .enabled(true)
///     .cooldown(Duration::from_secs(30))
///     .max_retries(3)
///     .build();
/// assert_eq!(config.delay_for_attempt(1, None), Some(Duration::from_secs(30)));
/// assert_eq!(config.delay_for_attempt(4, None), None);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether 429 responses are retried at all. When disabled a 429 is
    /// reported as a client error.
    pub enabled: bool,

    /// Fixed wait before replaying a rate-limited call. Defaults to 60 seconds.
    pub cooldown: Duration,

    /// How many replays are allowed before giving up. Defaults to 5.
    pub max_retries: usize,

    /// Wait for the server's `Retry-After`/reset hint instead of the fixed
    /// cooldown when one is present. The hint is capped by `cooldown`.
    pub respect_retry_after: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown: Duration::from_secs(60),
            max_retries: 5,
            respect_retry_after: false,
        }
    }
}

impl RateLimitConfig {
    /// Creates a new builder for configuring rate limit handling.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    /// Rate-limit control on, with default cooldown and bound.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Rate-limit control off: 429 is terminal.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns the wait before replay number `attempt` (1-indexed), or `None`
    /// when control is disabled or the retry budget is spent.
    pub fn delay_for_attempt(&self, attempt: usize, info: Option<&RateLimitInfo>) -> Option<Duration> {
        if !self.enabled || attempt > self.max_retries {
            return None;
        }

        let hinted = if self.respect_retry_after {
            info.and_then(RateLimitInfo::server_delay)
        } else {
            None
        };

        Some(hinted.map_or(self.cooldown, |d| d.min(self.cooldown)))
    }
}

/// Builder for `RateLimitConfig`.
#[derive(Default)]
pub struct RateLimitConfigBuilder {
    enabled: Option<bool>,
    cooldown: Option<Duration>,
    max_retries: Option<usize>,
    respect_retry_after: Option<bool>,
}

impl RateLimitConfigBuilder {
    /// Sets whether rate limit handling is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the cooldown between replays.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Sets the maximum number of replays.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets whether to respect the Retry-After header.
    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = Some(respect);
        self
    }

    /// Builds the `RateLimitConfig`.
    pub fn build(self) -> RateLimitConfig {
        let default = RateLimitConfig::default();
        RateLimitConfig {
            enabled: self.enabled.unwrap_or(default.enabled),
            cooldown: self.cooldown.unwrap_or(default.cooldown),
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            respect_retry_after: self
                .respect_retry_after
                .unwrap_or(default.respect_retry_after),
        }
    }
}

/// Parses the Retry-After header.
///
/// Supports both delay-seconds (integer) and HTTP-date formats.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    httpdate::parse_http_date(header)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

/// Parses X-RateLimit-Reset or RateLimit-Reset headers (Unix timestamp).
fn parse_rate_limit_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok()?.parse::<u64>().ok())
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
        .next()
}

fn parse_rate_limit_remaining(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("x-ratelimit-remaining")?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
