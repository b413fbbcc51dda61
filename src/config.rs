//! SDK configuration.
//!
//! A [`Config`] is created once per SDK instance with [`Config::builder`] (or
//! [`Config::from_env`]) and handed to [`crate::Transport::new`].

use crate::{rate_limit::RateLimitConfig, Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const TOKEN_PATH: &str = "/oauth/v2/token";

/// Provider environments. Each maps to one fixed base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live environment.
    Production,
    /// Homologation environment.
    Uat,
    /// Sandbox with synthetic data.
    #[default]
    Sandbox,
}

impl Environment {
    /// The base URL every request path is appended to.
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Production => "https://cdpj.partners.bancointer.com.br",
            Environment::Uat => "https://cdpj-uat.partners.uatinter.co",
            Environment::Sandbox => "https://cdpj-sandbox.partners.uatinter.co",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCTION" => Ok(Environment::Production),
            "UAT" => Ok(Environment::Uat),
            "SANDBOX" => Ok(Environment::Sandbox),
            other => Err(Error::Configuration(format!(
                "Unknown environment: {}",
                other
            ))),
        }
    }
}

/// Immutable SDK configuration.
///
/// # Examples
///
/// ```no_run
/// use inter_sdk_core::{Config, Environment};
///
/// # fn example() -> Result<(), inter_sdk_core::Error> {
/// let config = Config::builder()
///     .environment(Environment::Production)
///     .client_id("my-client-id")
///     .client_secret("my-client-secret")
///     .certificate("/etc/inter/certificate.pfx", "pfx-password")
///     .account("12345678")
///     .rate_limit_control(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Config {
    environment: Environment,
    base_url: Url,
    client_id: String,
    client_secret: String,
    certificate_path: PathBuf,
    certificate_password: String,
    account: Option<String>,
    rate_limit: RateLimitConfig,
    debug: bool,
    timeout: Option<Duration>,
    expiry_warning_days: i64,
}

impl Config {
    /// Creates a new `ConfigBuilder`.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Builds a configuration from `INTER_*` environment variables.
    ///
    /// `INTER_CLIENT_ID`, `INTER_CLIENT_SECRET`, `INTER_CERTIFICATE_PATH` and
    /// `INTER_CERTIFICATE_PASSWORD` are required. `INTER_ENVIRONMENT`,
    /// `INTER_ACCOUNT`, `INTER_RATE_LIMIT_CONTROL` and `INTER_DEBUG` are optional.
    pub fn from_env() -> Result<Self> {
        let mut builder = Config::builder()
            .client_id(required_var("INTER_CLIENT_ID")?)
            .client_secret(required_var("INTER_CLIENT_SECRET")?)
            .certificate(
                required_var("INTER_CERTIFICATE_PATH")?,
                required_var("INTER_CERTIFICATE_PASSWORD")?,
            )
            .rate_limit_control(flag_var("INTER_RATE_LIMIT_CONTROL"))
            .debug(flag_var("INTER_DEBUG"));

        if let Ok(environment) = std::env::var("INTER_ENVIRONMENT") {
            builder = builder.environment(environment.parse()?);
        }
        if let Ok(account) = std::env::var("INTER_ACCOUNT") {
            builder = builder.account(account);
        }

        builder.build()
    }

    /// The selected environment.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The OAuth2 token endpoint for this environment.
    pub fn token_url(&self) -> Result<Url> {
        self.url_for(TOKEN_PATH)
    }

    /// Appends a resource path to the base URL, keeping any path prefix the
    /// base URL already has.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    /// OAuth2 client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth2 client secret.
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Location of the PKCS#12 bundle.
    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    /// Password protecting the PKCS#12 bundle.
    pub fn certificate_password(&self) -> &str {
        &self.certificate_password
    }

    /// Checking account the transport starts with. Later changes go through
    /// [`crate::Transport::set_account`].
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Policy for 429 responses.
    pub fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    /// Whether request and response bodies are logged.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Days before expiry at which the client certificate triggers a warning.
    pub fn expiry_warning_days(&self) -> i64 {
        self.expiry_warning_days
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("certificate_path", &self.certificate_path)
            .field("certificate_password", &"<redacted>")
            .field("account", &self.account)
            .field("rate_limit", &self.rate_limit)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    environment: Environment,
    base_url: Option<Url>,
    client_id: Option<String>,
    client_secret: Option<String>,
    certificate: Option<(PathBuf, String)>,
    account: Option<String>,
    rate_limit: RateLimitConfig,
    debug: bool,
    timeout: Option<Duration>,
    expiry_warning_days: i64,
}

impl ConfigBuilder {
    /// Creates a builder targeting the sandbox with rate-limit control off.
    pub fn new() -> Self {
        Self {
            environment: Environment::default(),
            base_url: None,
            client_id: None,
            client_secret: None,
            certificate: None,
            account: None,
            rate_limit: RateLimitConfig::default(),
            debug: false,
            timeout: None,
            expiry_warning_days: 30,
        }
    }

    /// Selects the environment (and therefore the base URL).
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Overrides the environment's base URL, e.g. for a forward proxy or a
    /// local test server.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the OAuth2 client id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the OAuth2 client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets the PKCS#12 bundle path and its password.
    pub fn certificate(mut self, path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        self.certificate = Some((path.into(), password.into()));
        self
    }

    /// Sets the checking account sent on every request.
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Turns the 429 cooldown-and-retry behaviour on or off, keeping the
    /// remaining rate-limit settings.
    pub fn rate_limit_control(mut self, enabled: bool) -> Self {
        self.rate_limit.enabled = enabled;
        self
    }

    /// Replaces the whole rate-limit policy.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Logs request and response bodies when set.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the certificate expiry warning threshold, in days.
    pub fn expiry_warning_days(mut self, days: i64) -> Self {
        self.expiry_warning_days = days;
        self
    }

    /// Builds the configured `Config`.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials or the certificate are missing.
    pub fn build(self) -> Result<Config> {
        let client_id = non_empty(self.client_id, "client id")?;
        let client_secret = non_empty(self.client_secret, "client secret")?;
        let (certificate_path, certificate_password) = self
            .certificate
            .ok_or_else(|| Error::Configuration("Certificate is required".to_string()))?;

        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(self.environment.base_url())?,
        };

        Ok(Config {
            environment: self.environment,
            base_url,
            client_id,
            client_secret,
            certificate_path,
            certificate_password,
            account: self.account,
            rate_limit: self.rate_limit,
            debug: self.debug,
            timeout: self.timeout,
            expiry_warning_days: self.expiry_warning_days,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<String>, what: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Configuration(format!("{} is required", what)))
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Configuration(format!("{} is not set", name)))
}

fn flag_var(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConfigBuilder {
        Config::builder()
            .client_id("id")
            .client_secret("secret")
            .certificate("/tmp/cert.pfx", "pw")
    }

    #[test]
    fn test_environment_selects_base_url() {
        let config = builder().environment(Environment::Production).build().unwrap();
        assert_eq!(
            config.base_url().as_str(),
            "https://cdpj.partners.bancointer.com.br/"
        );
        assert_eq!(
            config.token_url().unwrap().as_str(),
            "https://cdpj.partners.bancointer.com.br/oauth/v2/token"
        );
    }

    #[test]
    fn test_base_url_override() {
        let config = builder()
            .base_url("http://127.0.0.1:8080")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            config.url_for("/pix/v2/cob").unwrap().as_str(),
            "http://127.0.0.1:8080/pix/v2/cob"
        );
    }

    #[test]
    fn test_base_url_path_prefix_is_kept() {
        let config = builder()
            .base_url("http://proxy.local/inter")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            config.url_for("/pix/v2/cob").unwrap().as_str(),
            "http://proxy.local/inter/pix/v2/cob"
        );
        assert_eq!(
            config.token_url().unwrap().as_str(),
            "http://proxy.local/inter/oauth/v2/token"
        );
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = Config::builder()
            .client_id("id")
            .certificate("/tmp/cert.pfx", "pw")
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_missing_certificate_is_rejected() {
        let result = Config::builder().client_id("id").client_secret("s").build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_rate_limit_control_keeps_other_settings() {
        let config = builder()
            .rate_limit(
                RateLimitConfig::builder()
                    .cooldown(Duration::from_secs(5))
                    .build(),
            )
            .rate_limit_control(true)
            .build()
            .unwrap();
        assert!(config.rate_limit().enabled);
        assert_eq!(config.rate_limit().cooldown, Duration::from_secs(5));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("uat".parse::<Environment>().unwrap(), Environment::Uat);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = builder().build().unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret\""));
        assert!(printed.contains("<redacted>"));
    }
}
