//! Declarative endpoint descriptions.

use std::collections::HashMap;

use serde_json::{Map, Value};
use url::Url;

use crate::{LocalError, Method, NetworkError, Request};

/// A declarative description of one API call.
///
/// Endpoints are resolved against a session's base URL at request time, so
/// the same value can be reused across sessions pointing at different hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    path: String,
    method: Method,
    parameters: Map<String, Value>,
    headers: HashMap<String, String>,
    task_id: Option<String>,
}

impl Endpoint {
    /// Create an endpoint for `path` with the given method.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            parameters: Map::new(),
            headers: HashMap::new(),
            task_id: None,
        }
    }

    /// Create a GET endpoint.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Create a POST endpoint.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Create a PUT endpoint.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// Create a PATCH endpoint.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// Create a DELETE endpoint.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Add a parameter. Encoded in the query string or JSON body depending on
    /// the method.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set an explicit task identity used for deduplication.
    pub fn task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    /// The endpoint path, relative to the base URL unless absolute.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The parameters.
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// The explicit task identity, if any.
    pub fn explicit_task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Resolve the absolute URL of this endpoint against `base_url`.
    ///
    /// Absolute paths ignore the base entirely. The base is treated as a
    /// directory, so `https://host/v1` + `users` gives `https://host/v1/users`.
    pub fn resolve_url(&self, base_url: &str) -> Result<Url, NetworkError> {
        if let Ok(url) = Url::parse(&self.path) {
            if !url.cannot_be_a_base() {
                return Ok(url);
            }
        }

        let mut base = Url::parse(base_url)
            .map_err(|e| NetworkError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(NetworkError::InvalidBaseUrl(base_url.to_string()));
        }
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }

        base.join(self.path.trim_start_matches('/'))
            .map_err(|e| LocalError::invalid_url(format!("{}: {}", self.path, e)).into())
    }

    /// Build the transport request for this endpoint.
    pub fn to_request(&self, base_url: &str) -> Result<Request, NetworkError> {
        let mut url = self.resolve_url(base_url)?;
        let mut body = None;

        if !self.parameters.is_empty() {
            if self.method.encodes_parameters_in_url() {
                let mut query = url.query_pairs_mut();
                for (key, value) in &self.parameters {
                    match value {
                        Value::String(s) => query.append_pair(key, s),
                        Value::Null => query.append_key_only(key),
                        other => query.append_pair(key, &other.to_string()),
                    };
                }
            } else {
                body = Some(serde_json::to_vec(&self.parameters)?);
            }
        }

        let mut request = Request::new(self.method, url).headers(self.headers.clone());
        if let Some(body) = body {
            request = request.header("Content-Type", "application/json").body(body);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.example.com/v1";

    #[test]
    fn test_resolve_relative_path() {
        let url = Endpoint::get("/users/42").resolve_url(BASE).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/42");

        let url = Endpoint::get("users/42")
            .resolve_url("https://api.example.com/v1/")
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/42");
    }

    #[test]
    fn test_resolve_absolute_path_ignores_base() {
        let url = Endpoint::get("https://cdn.example.com/a.png")
            .resolve_url("not a url")
            .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = Endpoint::get("/users").resolve_url("::nope").unwrap_err();
        assert!(matches!(err, NetworkError::InvalidBaseUrl(_)));
    }

    #[test]
    fn test_get_parameters_go_to_query() {
        let request = Endpoint::get("/search")
            .parameter("q", "red shoes")
            .parameter("page", 2)
            .to_request(BASE)
            .unwrap();
        assert_eq!(
            request.url.as_str(),
            "https://api.example.com/v1/search?page=2&q=red+shoes"
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn test_post_parameters_go_to_body() {
        let request = Endpoint::post("/carts")
            .parameter("sku", "A-1")
            .header("X-Client", "ios")
            .to_request(BASE)
            .unwrap();
        assert_eq!(request.url.as_str(), "https://api.example.com/v1/carts");
        assert_eq!(request.body.as_deref(), Some(&br#"{"sku":"A-1"}"#[..]));
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(request.header_value("x-client"), Some("ios"));
    }
}
