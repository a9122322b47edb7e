use std::fmt::Debug;

use bytes::Bytes;
use futures_util::{stream::BoxStream, StreamExt, TryStreamExt};
use snafu::prelude::*;

use super::error::{backend_error, variant::*, BackendError, BoxError};
use super::types::{Request, Response};
use super::Result;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Something which can execute a [`Request`].
///
/// Returning `Err` means no response was received at all, either the request
/// could not be built or it got lost on the way (network/DNS/TLS failure).
/// Any http status, including error ones, must be returned as `Ok`.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + Debug {
    /// execute the request once
    async fn execute(&self, request: &Request) -> std::result::Result<Response, BackendError>;

    /// open a streaming GET and return the body chunks, used by sse client
    async fn stream(&self, path: &str) -> std::result::Result<ByteStream, BoxError>;
}

/// Body chunks of a streaming response
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, BoxError>>;

/// [`Backend`] over a real HTTP client.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend sending requests to `base` + request path, credentials kept in a cookie store
    pub fn new<S: Into<String>>(base: S) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .cookie_store(true)
            .user_agent(APP_USER_AGENT)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self {
            base: base.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn execute(&self, request: &Request) -> std::result::Result<Response, BackendError> {
        let url = self.url(&request.path);

        log::trace!("{} {}", request.method, url);

        let mut req = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(ref body) = request.body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(
                    serde_json::to_vec(body)
                        .map_err(BoxError::from)
                        .context(backend_error::Build)?,
                );
        }
        let req = req
            .build()
            .map_err(BoxError::from)
            .context(backend_error::Build)?;

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(BoxError::from)
            .context(backend_error::Unreachable)?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(BoxError::from)
            .context(backend_error::Unreachable)?;

        log::trace!("{} {} got {}, {} bytes", request.method, url, status, body.len());

        Ok(Response::new(status, body))
    }

    async fn stream(&self, path: &str) -> std::result::Result<ByteStream, BoxError> {
        let url = self.url(path);

        log::trace!("GET {} as event stream", url);

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        Ok(resp
            .error_for_status()?
            .bytes_stream()
            .map_err(BoxError::from)
            .boxed())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_http_backend_url_join() {
        let backend = HttpBackend::new("https://judge.example.com/api").unwrap();
        assert_eq!(
            backend.url("/auth/refresh"),
            "https://judge.example.com/api/auth/refresh"
        );
    }

    #[tokio::test]
    async fn test_invalid_url_fails_to_build() {
        let backend = HttpBackend::new("http://127.0.0.1:1").unwrap();

        let err = backend.execute(&Request::get(":bad")).await.unwrap_err();

        assert!(matches!(err, BackendError::Build { .. }), "got {:?}", err);
    }
}
