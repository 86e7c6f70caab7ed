//! Outgoing HTTP request values.

use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use url::Url;

use crate::NetworkError;

/// HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Convert to HTTP method string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether endpoint parameters travel in the query string rather than
    /// the body for this method.
    pub fn encodes_parameters_in_url(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Encoded body.
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a new request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Add a header to the request, replacing any value already set under
    /// the same name (case-insensitively).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.headers.insert(key, value.into());
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        for (key, value) in headers {
            self = self.header(key, value);
        }
        self
    }

    /// Look up a header value (case-insensitive).
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body as a string.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        if self.header_value("Content-Type").is_none() {
            self = self.header("Content-Type", "text/plain");
        }
        self.body = Some(text.into().into_bytes());
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, NetworkError> {
        let json = serde_json::to_vec(value)?;
        self = self.header("Content-Type", "application/json");
        self.body = Some(json);
        Ok(self)
    }

    /// Add a bearer token authorization header.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Add a basic authorization header.
    pub fn basic_auth(self, username: impl AsRef<str>, password: Option<&str>) -> Self {
        let credentials = match password {
            Some(pass) => format!("{}:{}", username.as_ref(), pass),
            None => format!("{}:", username.as_ref()),
        };
        let encoded = STANDARD.encode(credentials.as_bytes());
        self.header("Authorization", format!("Basic {}", encoded))
    }

    /// Set the Accept header.
    pub fn accept(self, content_type: impl Into<String>) -> Self {
        self.header("Accept", content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(Method::Get, Url::parse("https://api.example.com/items").unwrap())
    }

    #[test]
    fn test_method_parameter_placement() {
        assert!(Method::Get.encodes_parameters_in_url());
        assert!(Method::Delete.encodes_parameters_in_url());
        assert!(!Method::Post.encodes_parameters_in_url());
        assert!(!Method::Patch.encodes_parameters_in_url());
    }

    #[test]
    fn test_header_replaces_case_insensitively() {
        let req = request()
            .header("authorization", "Bearer old")
            .bearer_auth("new");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header_value("AUTHORIZATION"), Some("Bearer new"));
    }

    #[test]
    fn test_basic_auth() {
        let req = request().basic_auth("user", Some("pass"));
        assert_eq!(req.header_value("Authorization"), Some("Basic dXNlcjpwYXNz"));

        let req = request().basic_auth("user", None);
        assert_eq!(req.header_value("Authorization"), Some("Basic dXNlcjo="));
    }

    #[test]
    fn test_json_body() {
        let req = request().json(&serde_json::json!({ "sku": "A-1" })).unwrap();
        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(&br#"{"sku":"A-1"}"#[..]));
    }

    #[test]
    fn test_text_keeps_existing_content_type() {
        let req = request().header("Content-Type", "text/csv").text("a,b");
        assert_eq!(req.header_value("Content-Type"), Some("text/csv"));
        assert_eq!(req.body.as_deref(), Some(&b"a,b"[..]));
    }
}
