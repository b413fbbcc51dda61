//! OAuth2 client-credentials tokens and their cache.
//!
//! Tokens are cached per `(client id, client secret, scope)`. A cached token
//! is handed out only while it still has at least [`SAFETY_MARGIN`] of life
//! left; otherwise the caller refreshes it against the token endpoint.
//! Refreshes for one key are single-flight: concurrent callers wait for the
//! refresh already in progress instead of starting their own.

use crate::{error::ApiError, Config, Error, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Remaining lifetime below which a cached token is no longer handed out.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// A bearer token as issued by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// The bearer value
    pub access_token: String,
    /// Usually `Bearer`
    pub token_type: String,
    /// Scope(s) the token was granted for
    pub scope: String,
    /// When the token was issued
    pub issued_at: SystemTime,
    /// Lifetime in seconds, counted from `issued_at`
    pub expires_in: u64,
}

impl CachedToken {
    /// Moment the token stops being accepted by the provider, or `None` when
    /// the lifetime is too large to represent (the token never expires).
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.issued_at.checked_add(Duration::from_secs(self.expires_in))
    }

    /// `true` iff `now + 60s <= issued_at + expires_in`.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        match (self.expires_at(), now.checked_add(SAFETY_MARGIN)) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(expires_at), Some(deadline)) => deadline <= expires_at,
        }
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token endpoint response body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
    /// Unix seconds. Rarely sent by the provider.
    #[serde(default)]
    created_at: Option<u64>,
}

impl TokenResponse {
    /// `created_at` when present and representable, the local clock otherwise.
    fn issued_at(&self) -> SystemTime {
        self.created_at
            .and_then(|secs| UNIX_EPOCH.checked_add(Duration::from_secs(secs)))
            .unwrap_or_else(SystemTime::now)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct TokenKey {
    client_id: String,
    client_secret: String,
    scope: String,
}

impl TokenKey {
    fn new(config: &Config, scope: &str) -> Self {
        Self {
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
            scope: scope.to_string(),
        }
    }
}

#[derive(Default)]
struct Slot {
    token: RwLock<Option<CachedToken>>,
    refresh: tokio::sync::Mutex<()>,
}

impl Slot {
    fn valid_token(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .filter(|token| TokenCache::validate(token))
            .map(|token| token.access_token.clone())
    }
}

/// Concurrency-safe cache of bearer tokens.
///
/// Owned by the SDK client and shared via `Arc` between every
/// [`crate::Transport`] that should reuse tokens.
#[derive(Default)]
pub struct TokenCache {
    slots: DashMap<TokenKey, Arc<Slot>>,
}

impl TokenCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a valid access token for the configured client and `scope`,
    /// requesting a new one when none is cached or the cached one is about
    /// to expire.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`] when the token endpoint rejects the request,
    /// [`Error::Transport`] when it cannot be reached. Nothing is cached on
    /// failure.
    pub async fn get(&self, http: &reqwest::Client, config: &Config, scope: &str) -> Result<String> {
        let slot = self.slot(TokenKey::new(config, scope));

        if let Some(token) = slot.valid_token() {
            return Ok(token);
        }

        let _refresh = slot.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = slot.valid_token() {
            tracing::trace!(scope = scope, "Reusing token refreshed by concurrent caller");
            return Ok(token);
        }

        let token = Self::generate_token(http, config, scope).await?;
        let access_token = token.access_token.clone();
        *slot.token.write() = Some(token);
        Ok(access_token)
    }

    /// Applies the 60-second margin against the current time.
    pub fn validate(token: &CachedToken) -> bool {
        token.is_valid_at(SystemTime::now())
    }

    /// Requests a new token with the client-credentials grant.
    ///
    /// When the response has no `created_at`, the token is stamped with the
    /// local clock. Clock skew between this host and the provider therefore
    /// shifts the token's effective lifetime.
    pub async fn generate_token(
        http: &reqwest::Client,
        config: &Config,
        scope: &str,
    ) -> Result<CachedToken> {
        let url = config.token_url()?;
        let form = [
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret()),
            ("grant_type", "client_credentials"),
            ("scope", scope),
        ];

        tracing::debug!(url = %url, scope = scope, "Requesting access token");
        let start_time = Instant::now();

        let mut request = http.post(url).form(&form);
        if let Some(timeout) = config.timeout() {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                scope = scope,
                "Token endpoint rejected credentials"
            );
            return Err(Error::Authentication {
                status,
                error: ApiError::from_response(status, &body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::Authentication {
                status,
                error: ApiError {
                    detail: Some(format!("unreadable token response: {}", e)),
                    ..ApiError::from_status(status)
                },
            })?;

        let issued_at = parsed.issued_at();

        tracing::info!(
            scope = scope,
            expires_in = parsed.expires_in,
            latency_ms = start_time.elapsed().as_millis(),
            "Obtained access token"
        );

        Ok(CachedToken {
            access_token: parsed.access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: parsed.scope.unwrap_or_else(|| scope.to_string()),
            issued_at,
            expires_in: parsed.expires_in,
        })
    }

    /// Returns the cached token for `scope` without validating or refreshing it.
    pub fn cached(&self, config: &Config, scope: &str) -> Option<CachedToken> {
        let slot = self.slots.get(&TokenKey::new(config, scope))?;
        let token = slot.token.read().clone();
        token
    }

    /// Drops the cached token for `scope`, forcing the next `get` to refresh.
    pub fn invalidate(&self, config: &Config, scope: &str) {
        if let Some(slot) = self.slots.get(&TokenKey::new(config, scope)) {
            slot.token.write().take();
        }
    }

    /// Drops every cached token.
    ///
    /// Slots are kept so a refresh already in flight stays the one that
    /// concurrent callers wait on.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.token.write().take();
        }
    }

    fn slot(&self, key: TokenKey) -> Arc<Slot> {
        // Clone out so the shard lock is released before any await.
        if let Some(slot) = self.slots.get(&key) {
            return slot.value().clone();
        }
        self.slots.entry(key).or_default().value().clone()
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(issued_at: SystemTime, expires_in: u64) -> CachedToken {
        CachedToken {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            scope: "extrato.read".to_string(),
            issued_at,
            expires_in,
        }
    }

    #[test]
    fn test_validity_boundary_is_sixty_seconds() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let token = token(t, 3600);
        let expiry = t + Duration::from_secs(3600);

        assert!(token.is_valid_at(expiry - Duration::from_secs(61)));
        assert!(token.is_valid_at(expiry - Duration::from_secs(60)));
        assert!(!token.is_valid_at(expiry - Duration::from_secs(59)));
    }

    #[test]
    fn test_huge_lifetime_never_expires() {
        let token = token(SystemTime::now(), u64::MAX);
        assert!(token.expires_at().is_none());
        assert!(TokenCache::validate(&token));
    }

    #[test]
    fn test_huge_created_at_falls_back_to_local_clock() {
        let json = r#"{"access_token":"tok","expires_in":3600,"created_at":18446744073709551615}"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(TokenCache::validate(&token(parsed.issued_at(), 3600)));
    }

    #[test]
    fn test_clear_keeps_slot_shared() {
        let config = Config::builder()
            .client_id("id")
            .client_secret("secret")
            .certificate("/tmp/c.pfx", "pw")
            .build()
            .unwrap();
        let cache = TokenCache::new();
        let key = TokenKey::new(&config, "pix.read");
        let before = cache.slot(key.clone());
        *before.token.write() = Some(token(SystemTime::now(), 3600));
        assert!(cache.cached(&config, "pix.read").is_some());

        cache.clear();

        assert!(cache.cached(&config, "pix.read").is_none());
        assert!(Arc::ptr_eq(&before, &cache.slot(key)));
    }

    #[test]
    fn test_validate_uses_current_time() {
        assert!(TokenCache::validate(&token(SystemTime::now(), 3600)));
        assert!(!TokenCache::validate(&token(SystemTime::now(), 30)));
        assert!(!TokenCache::validate(&token(
            SystemTime::now() - Duration::from_secs(7200),
            3600
        )));
    }

    #[test]
    fn test_debug_redacts_access_token() {
        let printed = format!("{:?}", token(SystemTime::now(), 3600));
        assert!(!printed.contains("abc"));
    }

    #[test]
    fn test_token_response_without_created_at() {
        let json = r#"{"access_token":"tok","token_type":"Bearer","expires_in":3600,"scope":"pix.read"}"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "tok");
        assert_eq!(parsed.expires_in, 3600);
        assert!(parsed.created_at.is_none());
    }

    #[test]
    fn test_key_includes_scope_and_secret() {
        let config = Config::builder()
            .client_id("id")
            .client_secret("secret")
            .certificate("/tmp/c.pfx", "pw")
            .build()
            .unwrap();
        let other_secret = Config::builder()
            .client_id("id")
            .client_secret("rotated")
            .certificate("/tmp/c.pfx", "pw")
            .build()
            .unwrap();

        assert!(TokenKey::new(&config, "a") != TokenKey::new(&config, "b"));
        assert!(TokenKey::new(&config, "a") != TokenKey::new(&other_secret, "a"));
        assert!(TokenKey::new(&config, "a") == TokenKey::new(&config.clone(), "a"));
    }
}
