use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use snafu::prelude::*;

use super::backend::{Backend, HttpBackend};
use super::error::BackendError;
use super::error::variant::*;
use super::loading::LoadingTracker;
use super::refresh::{RefreshCoordinator, Role};
use super::types::{error_message, Request, Response};
use super::{Error, Result};
use crate::{
    config::Config,
    notify::{Notice, NoticeKind, Notifier},
};

/// HTTP request gateway, the single choke point for REST calls.
///
/// It keeps a global loading signal, recovers from an expired access token by
/// refreshing it once and replaying the failed requests, and reports failures
/// to the [`Notifier`].
///
/// Cloned gateways share all of their state.
#[derive(Debug, Clone)]
pub struct Gateway {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    refresh_path: String,
    loading: LoadingTracker,
    refresher: RefreshCoordinator,
}

impl Gateway {
    /// Create gateway over any backend
    pub fn new<P: Into<String>>(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        refresh_path: P,
    ) -> Self {
        Self {
            backend,
            notifier,
            refresh_path: refresh_path.into(),
            loading: LoadingTracker::default(),
            refresher: RefreshCoordinator::default(),
        }
    }

    /// Create gateway talking HTTP to the configured api
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let backend = HttpBackend::new(config.api_base())?;

        log::debug!("Create gateway for {}", config.api_base());

        Ok(Self::new(
            Arc::new(backend),
            notifier,
            config.refresh_path(),
        ))
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Register a loading observer, called with `true` when the first request starts
    /// and `false` when the last one finishes.
    ///
    /// Observers are called synchronously. They may read the gateway state but
    /// must not send requests or subscribe themselves.
    pub fn subscribe_loading<F>(&self, observer: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.loading.subscribe(observer)
    }

    /// in-flight request count
    pub fn active_requests(&self) -> usize {
        self.loading.active()
    }

    /// true while any request is in flight
    pub fn is_loading(&self) -> bool {
        self.active_requests() > 0
    }

    /// true while a token refresh call is in flight
    pub fn is_refreshing(&self) -> bool {
        self.refresher.is_refreshing()
    }

    /// requests waiting for the in-flight token refresh
    pub fn waiting_requests(&self) -> usize {
        self.refresher.queued()
    }

    fn notify(&self, kind: NoticeKind) {
        self.notifier.notify(Notice::error(kind))
    }

    fn session_expired<T>(&self) -> Result<T> {
        self.notify(NoticeKind::SessionExpired);
        SessionExpired.fail()
    }

    fn reject(&self, request: &Request, response: Response) -> Error {
        let message = error_message(&response.body);

        log::debug!(
            "{} {} rejected with {}, message: {:?}",
            request.method,
            request.path,
            response.status,
            message
        );

        if let Some(ref message) = message {
            self.notify(NoticeKind::Rejected(message.clone()));
        } else if response.status.is_server_error() {
            self.notify(NoticeKind::ServerError);
        }

        Status {
            method: request.method.clone(),
            path: &request.path,
            status: response.status,
            message,
        }
        .build()
    }

    /// Send a request.
    ///
    /// A 401 is answered by one coordinated token refresh and a single replay,
    /// a replay which is still unauthorized ends the session.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let mut retried = false;

        loop {
            let result = {
                let _loading = self.loading.begin();
                self.backend.execute(&request).await
            };

            let response = match result {
                Ok(response) => response,
                Err(BackendError::Build { source }) => {
                    log::warn!("{} {} can't be built: {}", request.method, request.path, source);
                    return Err(source).context(BuildRequestFailed {
                        method: request.method.clone(),
                        path: &request.path,
                    });
                }
                Err(BackendError::Unreachable { source }) => {
                    log::warn!("{} {} got no response: {}", request.method, request.path, source);
                    self.notify(NoticeKind::Connectivity);
                    return Err(source).context(RequestFailed {
                        method: request.method.clone(),
                        path: &request.path,
                    });
                }
            };

            if response.status.is_success() {
                return Ok(response);
            }

            if request.targets(&self.refresh_path) {
                log::warn!("Refresh endpoint answered {}", response.status);
                return self.session_expired();
            }

            if response.status != StatusCode::UNAUTHORIZED {
                return Err(self.reject(&request, response));
            }

            if retried {
                log::warn!(
                    "{} {} still unauthorized after token refresh",
                    request.method,
                    request.path
                );
                return self.session_expired();
            }

            retried = true;
            log::debug!("{} {} unauthorized, refresh token", request.method, request.path);

            self.refresh().await?;

            log::debug!("Replay {} {}", request.method, request.path);
        }
    }

    /// Refresh access token, joining the in-flight refresh if there is one.
    ///
    /// Fails with [`Error::SessionExpired`] when the refresh endpoint rejects.
    pub async fn refresh(&self) -> Result<()> {
        loop {
            match self.refresher.join() {
                Role::Leader(ticket) => {
                    let refreshed = self.call_refresh().await;
                    let woken = ticket.finish(refreshed);

                    log::debug!("Refresh done, success = {}, woke {} waiters", refreshed, woken);

                    return if refreshed {
                        Ok(())
                    } else {
                        self.session_expired()
                    };
                }
                Role::Waiter(rx) => match rx.await {
                    Ok(true) => return Ok(()),
                    Ok(false) => return SessionExpired.fail(),
                    Err(_) => {
                        log::debug!("Refresh leader gone, join again");
                        continue;
                    }
                },
            }
        }
    }

    async fn call_refresh(&self) -> bool {
        let request = Request::post(self.refresh_path.as_str()).json(serde_json::json!({}));

        match self.backend.execute(&request).await {
            Ok(response) if response.status.is_success() => true,
            Ok(response) => {
                log::warn!("Token refresh rejected with {}", response.status);
                false
            }
            Err(err) => {
                log::warn!("Token refresh failed: {}", err);
                false
            }
        }
    }

    async fn call<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = Request::new(method, path);
        if let Some(body) = body {
            request = request.json(serde_json::to_value(body).context(EncodeBodyFailed)?);
        }

        let response = self.send(request).await?;

        // empty body, like 204, decodes as null
        let body: &[u8] = if response.body.is_empty() {
            b"null"
        } else {
            &response.body
        };

        serde_json::from_slice(body).with_context(|_| ParseBodyFailed {
            body: response.body.clone(),
        })
    }

    /// GET `path` and decode json body
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.call::<(), R>(Method::GET, path, None).await
    }

    /// POST json body to `path` and decode json response
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(Method::POST, path, Some(body)).await
    }

    /// PUT json body to `path` and decode json response
    pub async fn put_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(Method::PUT, path, Some(body)).await
    }

    /// PATCH json body to `path` and decode json response
    pub async fn patch_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(Method::PATCH, path, Some(body)).await
    }

    /// DELETE `path`
    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.send(Request::delete(path)).await
    }
}
