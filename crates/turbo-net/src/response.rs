//! HTTP response handling.

use crate::NetworkError;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// A complete HTTP response assembled from transport events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code.
    pub status: u16,
    /// The response headers.
    pub headers: HashMap<String, String>,
    /// The response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Create a new response.
    pub fn new(status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Check if the response was successful (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response was a client error (4xx status).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the response was a server error (5xx status).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String, NetworkError> {
        String::from_utf8(self.body.clone())
            .map_err(|e| NetworkError::Decoding(format!("Invalid UTF-8: {}", e)))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        serde_json::from_slice(&self.body).map_err(NetworkError::from)
    }

    /// Get the raw response body.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, keeping only the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Get a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Convert to a Result, returning a remote error for non-2xx status codes.
    pub fn error_for_status(self) -> Result<Self, NetworkError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(NetworkError::Remote {
                status: self.status,
                body: self.body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(status: u16, body: &[u8]) -> Response {
        Response::new(status, HashMap::new(), body.to_vec())
    }

    fn make_response_with_headers(
        status: u16,
        headers: Vec<(&str, &str)>,
        body: &[u8],
    ) -> Response {
        let headers: HashMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Response::new(status, headers, body.to_vec())
    }

    #[test]
    fn test_response_status_classes() {
        assert!(make_response(204, b"").is_success());
        assert!(!make_response(300, b"").is_success());
        assert!(make_response(401, b"").is_client_error());
        assert!(make_response(503, b"").is_server_error());
        assert!(!make_response(499, b"").is_server_error());
    }

    #[test]
    fn test_response_text_invalid_utf8() {
        let resp = make_response(200, &[0xff, 0xfe]);
        assert!(matches!(resp.text(), Err(NetworkError::Decoding(_))));
    }

    #[test]
    fn test_response_json() {
        use serde::Deserialize;

        #[derive(Deserialize, Debug, PartialEq)]
        struct Data {
            value: i32,
        }

        let resp = make_response(200, br#"{"value": 42}"#);
        let data: Data = resp.json().unwrap();
        assert_eq!(data, Data { value: 42 });

        let resp = make_response(200, b"not json");
        assert!(matches!(resp.json::<Data>(), Err(NetworkError::Decoding(_))));
    }

    #[test]
    fn test_response_header_case_insensitive() {
        let resp = make_response_with_headers(200, vec![("Content-Type", "text/html")], b"");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.content_type(), Some("text/html"));
        assert_eq!(resp.header("X-Missing"), None);
    }

    #[test]
    fn test_response_error_for_status_keeps_body() {
        assert!(make_response(200, b"OK").error_for_status().is_ok());

        let err = make_response(404, b"Not Found").error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.body(), Some(&b"Not Found"[..]));
    }
}
