//! Successful response wrapper.
//!
//! [`Response`] keeps the raw body the provider returned together with the
//! status, headers, latency and number of attempts, so facades can decode it
//! into their own types and still report how the call went.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A successful (2xx, or 304) HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The raw response body. Empty for 204 and 304.
    pub body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from the first attempt until this response, including any
    /// rate-limit cooldowns.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    pub attempts: usize,
}

impl Response {
    /// Creates a new `Response`.
    pub fn new(
        body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Decodes the body as JSON.
    ///
    /// ```
    /// # use inter_sdk_core::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     r#"{"disponivel": 42.5}"#.to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let balance: serde_json::Value = response.json().unwrap();
    /// assert_eq!(balance["disponivel"], 42.5);
    /// ```
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            tracing::error!(
                error = %e,
                status = self.status.as_u16(),
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response: self.body.clone(),
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }

    /// Returns `true` if the request was replayed after a rate limit.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Consumes the response, returning the body.
    pub fn into_body(self) -> String {
        self.body
    }
}

impl AsRef<str> for Response {
    fn as_ref(&self) -> &str {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str, attempts: usize) -> Response {
        Response::new(
            body.to_string(),
            StatusCode::OK,
            HeaderMap::new(),
            Duration::from_millis(5),
            attempts,
        )
    }

    #[test]
    fn test_json_failure_keeps_raw_body() {
        let result = response("not json", 1).json::<serde_json::Value>();
        match result {
            Err(Error::DeserializationFailed {
                raw_response,
                status,
                ..
            }) => {
                assert_eq!(raw_response, "not json");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_was_retried() {
        assert!(!response("", 1).was_retried());
        assert!(response("", 2).was_retried());
    }
}
