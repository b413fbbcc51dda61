//! Error types for the authenticated transport.
//!
//! Every non-success outcome surfaces as an [`Error`] variant. Failures that
//! came back from the provider carry a structured [`ApiError`] decoded from
//! the response body, so callers can pattern-match on the kind of failure
//! without losing the provider's explanation.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// The main error type for transport operations.
///
/// # Examples
///
/// ```no_run
/// use inter_sdk_core::{Error, Transport};
///
/// # async fn example(transport: Transport) {
/// match transport.get("/banking/v2/saldo", "extrato.read").await {
///     Ok(body) => println!("balance: {}", body),
///     Err(Error::Client { status, error }) => {
///         eprintln!("rejected ({}): {}", status, error.title);
///         for violation in &error.violations {
///             eprintln!("  {}: {}", violation.property, violation.reason);
///         }
///     }
///     Err(Error::Server { status, .. }) => eprintln!("provider failure {}", status),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The PKCS#12 file does not exist or could not be read.
    #[error("Certificate not found at {}: {source}", .path.display())]
    CertificateNotFound {
        /// Path that was attempted
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The PKCS#12 container is malformed or the password is wrong.
    #[error("Invalid certificate: {0}")]
    CertificateInvalid(String),

    /// The client certificate is past its `notAfter` date.
    #[error("Certificate expired at {not_after}")]
    CertificateExpired {
        /// The certificate's `notAfter` field as printed by the X.509 parser
        not_after: String,
    },

    /// The token endpoint rejected the client credentials.
    #[error("Authentication failed (status {status}): {error}")]
    Authentication {
        /// Status returned by the token endpoint
        status: StatusCode,
        /// Decoded or synthesized error payload
        error: ApiError,
    },

    /// The provider reported a caller-side fault (4xx, including 429 when
    /// rate-limit control is disabled).
    #[error("Client error {status}: {error}")]
    Client {
        /// The HTTP status code
        status: StatusCode,
        /// Decoded or synthesized error payload
        error: ApiError,
    },

    /// The provider reported a server-side fault.
    #[error("Server error {status}: {error}")]
    Server {
        /// The HTTP status code
        status: StatusCode,
        /// Decoded or synthesized error payload
        error: ApiError,
    },

    /// A network or TLS failure occurred before any response was obtained.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Rate-limit retries were exhausted.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// The number of attempts made
        attempts: usize,
        /// The last error encountered
        last_error: Box<Error>,
    },

    /// A successful body could not be decoded into the requested type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if retrying the same request later could succeed.
    ///
    /// Network failures, 5xx responses and 429s are retryable. Certificate,
    /// authentication and other 4xx failures are not.
    ///
    /// ```
    /// use inter_sdk_core::{ApiError, Error};
    /// use http::StatusCode;
    ///
    /// let err = Error::Server {
    ///     status: StatusCode::BAD_GATEWAY,
    ///     error: ApiError::from_status(StatusCode::BAD_GATEWAY),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Client {
    ///     status: StatusCode::BAD_REQUEST,
    ///     error: ApiError::from_status(StatusCode::BAD_REQUEST),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Server { .. } => true,
            Error::Client { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            Error::CertificateNotFound { .. }
            | Error::CertificateInvalid(_)
            | Error::CertificateExpired { .. }
            | Error::Authentication { .. }
            | Error::MaxRetriesExceeded { .. }
            | Error::DeserializationFailed { .. }
            | Error::Configuration(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Authentication { status, .. }
            | Error::Client { status, .. }
            | Error::Server { status, .. }
            | Error::DeserializationFailed { status, .. } => Some(*status),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.status(),
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the structured provider error, if the failure came from a response.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Authentication { error, .. }
            | Error::Client { error, .. }
            | Error::Server { error, .. } => Some(error),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.api_error(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error payload returned by the provider on failed requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Short summary of the failure
    #[serde(default)]
    pub title: String,
    /// Human-readable explanation
    #[serde(default)]
    pub detail: Option<String>,
    /// When the provider produced the error
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Field-level validation failures
    #[serde(default, alias = "violacoes")]
    pub violations: Vec<Violation>,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Why the value was rejected
    #[serde(default, alias = "razao")]
    pub reason: String,
    /// The offending property
    #[serde(default, alias = "propriedade")]
    pub property: String,
    /// The rejected value. Numbers and booleans are kept in their JSON text form.
    #[serde(default, alias = "valor", deserialize_with = "scalar_as_string")]
    pub value: Option<String>,
}

fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

impl ApiError {
    /// Synthesizes an error from the status line alone.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            title: status
                .canonical_reason()
                .unwrap_or("Unknown status")
                .to_string(),
            detail: Some(format!("HTTP {}", status.as_u16())),
            timestamp: Some(httpdate::fmt_http_date(SystemTime::now())),
            violations: Vec::new(),
        }
    }

    /// Decodes a failed response body, falling back to a synthesized error.
    ///
    /// An empty body yields [`ApiError::from_status`]. A body that is not a
    /// JSON error object is kept verbatim as the `detail`.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        if body.trim().is_empty() {
            return Self::from_status(status);
        }

        match serde_json::from_str::<ApiError>(body) {
            Ok(mut error) => {
                if error.title.is_empty() {
                    error.title = Self::from_status(status).title;
                }
                error
            }
            Err(_) => Self {
                detail: Some(body.to_string()),
                ..Self::from_status(status)
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(detail) = &self.detail {
            write!(f, " - {}", detail)?;
        }
        if !self.violations.is_empty() {
            write!(f, " ({} violation(s))", self.violations.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_provider_payload_with_portuguese_keys() {
        let body = r#"{
            "title": "Requisição inválida",
            "detail": "Campos obrigatórios ausentes",
            "timestamp": "2024-03-01T10:00:00-03:00",
            "violacoes": [
                {"razao": "não pode ser vazio", "propriedade": "valor", "valor": ""}
            ]
        }"#;

        let error = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(error.title, "Requisição inválida");
        assert_eq!(error.violations.len(), 1);
        assert_eq!(error.violations[0].property, "valor");
        assert_eq!(error.violations[0].reason, "não pode ser vazio");
        assert_eq!(error.violations[0].value.as_deref(), Some(""));
    }

    #[test]
    fn test_non_string_rejected_values_keep_violations() {
        let body = r#"{
            "title": "Requisição inválida",
            "violacoes": [
                {"razao": "deve ser maior que zero", "propriedade": "valor", "valor": 0},
                {"razao": "inválido", "propriedade": "ativo", "valor": true},
                {"razao": "obrigatório", "propriedade": "chave", "valor": null}
            ]
        }"#;

        let error = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(error.title, "Requisição inválida");
        assert_eq!(error.violations.len(), 3);
        assert_eq!(error.violations[0].value.as_deref(), Some("0"));
        assert_eq!(error.violations[1].value.as_deref(), Some("true"));
        assert_eq!(error.violations[2].value, None);
    }

    #[test]
    fn test_decodes_english_keys() {
        let body = r#"{"title":"Bad","violations":[{"reason":"r","property":"p","value":"v"}]}"#;
        let error = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(error.violations[0].property, "p");
    }

    #[test]
    fn test_empty_body_is_synthesized_from_status() {
        let error = ApiError::from_response(StatusCode::NOT_FOUND, "  ");
        assert_eq!(error.title, "Not Found");
        assert_eq!(error.detail.as_deref(), Some("HTTP 404"));
        assert!(error.timestamp.is_some());
        assert!(error.violations.is_empty());
    }

    #[test]
    fn test_non_json_body_kept_as_detail() {
        let error = ApiError::from_response(StatusCode::BAD_GATEWAY, "<html>upstream</html>");
        assert_eq!(error.title, "Bad Gateway");
        assert_eq!(error.detail.as_deref(), Some("<html>upstream</html>"));
    }

    #[test]
    fn test_status_of_exhausted_retries_comes_from_last_error() {
        let err = Error::MaxRetriesExceeded {
            attempts: 3,
            last_error: Box::new(Error::Client {
                status: StatusCode::TOO_MANY_REQUESTS,
                error: ApiError::from_status(StatusCode::TOO_MANY_REQUESTS),
            }),
        };
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert!(err.api_error().is_some());
        assert!(!err.is_retryable());
    }
}
