//! Request/response types of the gateway

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::Deserialize;

/// An outbound REST call.
///
/// Requests are plain data so the gateway can replay them after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// http method
    pub method: Method,
    /// path relative to api base url, starts with `/`
    pub path: String,
    /// query pairs
    pub query: Vec<(String, String)>,
    /// json body
    pub body: Option<serde_json::Value>,
}

impl Request {
    /// Create a request without query and body
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// GET request
    pub fn get<P: Into<String>>(path: P) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request
    pub fn post<P: Into<String>>(path: P) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request
    pub fn put<P: Into<String>>(path: P) -> Self {
        Self::new(Method::PUT, path)
    }

    /// PATCH request
    pub fn patch<P: Into<String>>(path: P) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// DELETE request
    pub fn delete<P: Into<String>>(path: P) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// append a query pair
    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// set json body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn targets(&self, path: &str) -> bool {
        self.path.contains(path)
    }
}

/// A response which reached the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// http status
    pub status: StatusCode,
    /// raw body
    pub body: Bytes,
}

impl Response {
    /// Create response from status and body
    pub fn new<B: Into<Bytes>>(status: StatusCode, body: B) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// parse body as json
    pub fn json<R: serde::de::DeserializeOwned>(&self) -> Result<R, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Text(String),
    Object { message: String },
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<Detail>,
}

/// Find a human readable message in an error body.
///
/// Checks `detail` as a string first, then `detail.message`.
pub(crate) fn error_message(body: &[u8]) -> Option<String> {
    let body: ErrorBody = serde_json::from_slice(body).ok()?;
    match body.detail? {
        Detail::Text(message) => Some(message),
        Detail::Object { message } => Some(message),
        Detail::Other(_) => None,
    }
}
