//! Authenticated mTLS transport.
//!
//! [`Transport`] is what the banking, billing and PIX facades call. Each call
//! obtains a bearer token for the requested scope, sends the request over a
//! client-certificate TLS connection and classifies the response into a body
//! or a typed [`Error`].

use crate::{
    certificate::{CertificateExpiry, CertificateMaterial},
    error::ApiError,
    metadata::RequestMetadata,
    rate_limit::RateLimitInfo,
    token::TokenCache,
    Config, Error, Response, Result,
};
use http::{header::CONTENT_TYPE, Method, StatusCode};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Header identifying the SDK flavour to the provider.
pub const SDK_HEADER: &str = "x-inter-sdk";
/// Header carrying the SDK version.
pub const SDK_VERSION_HEADER: &str = "x-inter-sdk-version";
/// Header selecting the checking account when a client manages several.
pub const ACCOUNT_HEADER: &str = "x-conta-corrente";

const SDK_NAME: &str = "rust";
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Executes bearer-authenticated requests over mutual TLS.
///
/// The transport is cheap to clone and is meant to be shared by every facade
/// of one SDK instance.
///
/// # Examples
///
/// ```no_run
/// use inter_sdk_core::{Config, Environment, Transport};
/// use http::Method;
///
/// # async fn example() -> Result<(), inter_sdk_core::Error> {
/// let config = Config::builder()
///     .environment(Environment::Sandbox)
///     .client_id("client-id")
///     .client_secret("client-secret")
///     .certificate("certificate.pfx", "password")
///     .build()?;
/// let transport = Transport::new(config)?;
///
/// let body = transport
///     .execute(
///         Method::POST,
///         "/pix/v2/cob",
///         "cob.write",
///         Some(r#"{"valor":{"original":"10.00"},"chave":"chave-pix"}"#),
///     )
///     .await?;
/// println!("{}", body);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    http_client: reqwest::Client,
    config: Config,
    tokens: Arc<TokenCache>,
    account: RwLock<Option<String>>,
    certificate_expiry: CertificateExpiry,
}

impl Transport {
    /// Creates a transport with its own token cache.
    ///
    /// # Errors
    ///
    /// Fails fast with a certificate error if the PKCS#12 bundle is missing,
    /// undecodable or expired.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_token_cache(config, Arc::new(TokenCache::new()))
    }

    /// Creates a transport sharing `tokens` with other transports.
    pub fn with_token_cache(config: Config, tokens: Arc<TokenCache>) -> Result<Self> {
        let material =
            CertificateMaterial::load(config.certificate_path(), config.certificate_password())?;

        let certificate_expiry = material.is_expiring_soon(config.expiry_warning_days())?;
        if certificate_expiry.expiring_soon {
            tracing::warn!(
                days_remaining = certificate_expiry.days_remaining,
                path = %config.certificate_path().display(),
                "Client certificate expires soon"
            );
        }

        let http_client = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(material.identity()?)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!(
            environment = ?config.environment(),
            base_url = %config.base_url(),
            "Transport ready"
        );

        Ok(Transport {
            inner: Arc::new(TransportInner {
                http_client,
                account: RwLock::new(config.account().map(str::to_string)),
                config,
                tokens,
                certificate_expiry,
            }),
        })
    }

    /// Executes a request and returns the raw response body.
    ///
    /// `body` is only sent for PUT, POST and PATCH, and only when non-empty.
    /// 204 and 304 responses yield an empty string.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        scope: &str,
        body: Option<&str>,
    ) -> Result<String> {
        let mut metadata = RequestMetadata::new(method, path);
        if let Some(body) = body {
            metadata = metadata.with_body(body);
        }
        Ok(self.call(metadata, scope).await?.into_body())
    }

    /// Executes a request described by `metadata`.
    ///
    /// A 429 is replayed from token acquisition onward after the configured
    /// cooldown while rate-limit control is enabled and the retry budget
    /// lasts. Every other outcome is final.
    pub async fn call(&self, metadata: RequestMetadata, scope: &str) -> Result<Response> {
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let token = self
                .inner
                .tokens
                .get(&self.inner.http_client, &self.inner.config, scope)
                .await?;
            let response = self.send(&metadata, &token, attempt).await?;

            let rate_limit = self.inner.config.rate_limit();
            if response.status() == StatusCode::TOO_MANY_REQUESTS && rate_limit.enabled {
                let status = response.status();
                let info = RateLimitInfo::from_headers(response.headers());
                let raw_response = response.text().await?;

                match rate_limit.delay_for_attempt(attempt, Some(&info)) {
                    Some(delay) => {
                        tracing::warn!(
                            delay_ms = delay.as_millis(),
                            attempt = attempt,
                            method = %metadata.method,
                            path = %metadata.path,
                            "Rate limited - waiting before retry"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => {
                        return Err(Error::MaxRetriesExceeded {
                            attempts: attempt,
                            last_error: Box::new(Error::Client {
                                status,
                                error: ApiError::from_response(status, &raw_response),
                            }),
                        });
                    }
                }
            }

            return self
                .classify(response, &metadata, start_time.elapsed(), attempt)
                .await;
        }
    }

    /// Sends a single attempt.
    async fn send(
        &self,
        metadata: &RequestMetadata,
        token: &str,
        attempt: usize,
    ) -> Result<reqwest::Response> {
        let mut url = self.inner.config.url_for(&metadata.path)?;
        if !metadata.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &metadata.query_params {
                pairs.append_pair(key, value);
            }
        }

        tracing::debug!(
            method = %metadata.method,
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let mut request = self
            .inner
            .http_client
            .request(metadata.method.clone(), url)
            .bearer_auth(token)
            .header(SDK_HEADER, SDK_NAME)
            .header(SDK_VERSION_HEADER, SDK_VERSION)
            .header(CONTENT_TYPE, "application/json");

        if let Some(account) = self.account() {
            request = request.header(ACCOUNT_HEADER, account);
        }

        for (name, value) in &metadata.headers {
            request = request.header(name, value);
        }

        if let Some(timeout) = self.inner.config.timeout() {
            request = request.timeout(timeout);
        }

        if let Some(body) = metadata.sendable_body() {
            if self.inner.config.debug() {
                tracing::info!(
                    method = %metadata.method,
                    path = %metadata.path,
                    body = body,
                    "Request body"
                );
            }
            request = request.body(body.to_string());
        }

        Ok(request.send().await?)
    }

    /// Maps a final response to a body or a typed error.
    async fn classify(
        &self,
        response: reqwest::Response,
        metadata: &RequestMetadata,
        latency: Duration,
        attempts: usize,
    ) -> Result<Response> {
        let status = response.status();
        let headers = response.headers().clone();

        tracing::info!(
            status = status.as_u16(),
            method = %metadata.method,
            path = %metadata.path,
            latency_ms = latency.as_millis(),
            attempts = attempts,
            "Received HTTP response"
        );

        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return Ok(Response::new(String::new(), status, headers, latency, attempts));
        }

        let raw_response = response.text().await?;

        if self.inner.config.debug() {
            tracing::info!(status = status.as_u16(), body = %raw_response, "Response body");
        }

        if status.is_success() {
            return Ok(Response::new(raw_response, status, headers, latency, attempts));
        }

        let error = ApiError::from_response(status, &raw_response);

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                response = %raw_response,
                "Client error (4xx)"
            );
            Err(Error::Client { status, error })
        } else {
            tracing::warn!(
                status = status.as_u16(),
                response = %raw_response,
                "Server error"
            );
            Err(Error::Server { status, error })
        }
    }

    /// GET `path` and return the body.
    pub async fn get(&self, path: &str, scope: &str) -> Result<String> {
        self.execute(Method::GET, path, scope, None).await
    }

    /// POST a JSON body to `path`.
    pub async fn post(&self, path: &str, scope: &str, body: &str) -> Result<String> {
        self.execute(Method::POST, path, scope, Some(body)).await
    }

    /// PUT a JSON body to `path`.
    pub async fn put(&self, path: &str, scope: &str, body: &str) -> Result<String> {
        self.execute(Method::PUT, path, scope, Some(body)).await
    }

    /// PATCH `path` with a JSON body.
    pub async fn patch(&self, path: &str, scope: &str, body: &str) -> Result<String> {
        self.execute(Method::PATCH, path, scope, Some(body)).await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str, scope: &str) -> Result<String> {
        self.execute(Method::DELETE, path, scope, None).await
    }

    /// The account currently sent in the account-override header.
    pub fn account(&self) -> Option<String> {
        self.inner.account.read().clone()
    }

    /// Sets or clears the account override for subsequent requests.
    pub fn set_account(&self, account: Option<String>) {
        *self.inner.account.write() = account;
    }

    /// The configuration this transport was built from.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The token cache backing this transport.
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.inner.tokens
    }

    /// Certificate validity as checked at construction.
    pub fn certificate_expiry(&self) -> CertificateExpiry {
        self.inner.certificate_expiry
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.inner.config)
            .field("certificate_expiry", &self.inner.certificate_expiry)
            .finish_non_exhaustive()
    }
}
