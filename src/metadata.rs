//! Per-request descriptor.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::collections::HashMap;

/// Everything needed to issue one business request: method, resource path,
/// query parameters, extra headers and an optional JSON body.
///
/// The bearer token, SDK identification headers and account override are
/// added by the transport and must not be set here.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The resource path, relative to the environment's base URL.
    pub path: String,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Query parameters for this request.
    pub query_params: HashMap<String, String>,

    /// JSON request body. Only sent for PUT, POST and PATCH.
    pub body: Option<String>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: HashMap::new(),
            body: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Attaches a raw JSON body.
    pub fn with_body(mut self, json: impl Into<String>) -> Self {
        self.body = Some(json.into());
        self
    }

    /// Serializes `value` as the JSON body.
    pub fn with_json<T: serde::Serialize>(self, value: &T) -> Result<Self, crate::Error> {
        let json = serde_json::to_string(value)
            .map_err(|e| crate::Error::Configuration(format!("Unserializable body: {}", e)))?;
        Ok(self.with_body(json))
    }

    /// The body to send, if the method carries one and it is non-empty.
    pub fn sendable_body(&self) -> Option<&str> {
        let carries_body = matches!(self.method, Method::PUT | Method::POST | Method::PATCH);
        self.body
            .as_deref()
            .filter(|body| carries_body && !body.trim().is_empty())
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_only_sent_for_writing_methods() {
        let post = RequestMetadata::new(Method::POST, "/x").with_body("{}");
        assert_eq!(post.sendable_body(), Some("{}"));

        let get = RequestMetadata::new(Method::GET, "/x").with_body("{}");
        assert_eq!(get.sendable_body(), None);

        let delete = RequestMetadata::new(Method::DELETE, "/x").with_body("{}");
        assert_eq!(delete.sendable_body(), None);
    }

    #[test]
    fn test_empty_body_not_sent() {
        let put = RequestMetadata::new(Method::PUT, "/x").with_body("  ");
        assert_eq!(put.sendable_body(), None);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let result = RequestMetadata::new(Method::GET, "/x").with_header("bad header", "v");
        assert!(matches!(result, Err(crate::Error::Configuration(_))));
    }
}
