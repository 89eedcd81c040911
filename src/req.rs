//! Generic HTTP exchange types and the sender seam the transport is built on.

use std::{future::Future, sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE},
    Method, StatusCode,
};

use crate::error::Result;

/// Header carrying the server-issued anti-replay nonce.
pub const REPLAY_NONCE: HeaderName = HeaderName::from_static("replay-nonce");

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request that accepts JSON responses.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, APPLICATION_JSON);

        HttpRequest {
            method,
            url: url.into(),
            headers,
            body: None,
        }
    }

    /// Attaches a JSON-encoded body.
    pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        self.body = Some(body);
        self
    }

    /// Body as (lossy) UTF-8, for logs and test assertions.
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .unwrap_or_default()
    }
}

/// A received HTTP response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the header value if present and valid visible ASCII.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as (lossy) UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The request never produced a response (DNS, connect, TLS, timeout, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConnectionError(pub String);

/// Sends HTTP requests on behalf of the transport.
///
/// Implementations must surface any received response as `Ok`, error statuses included, and only
/// use `Err` when no response was obtained.
pub trait HttpSender: Send + Sync {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = std::result::Result<HttpResponse, ConnectionError>> + Send;
}

impl<S: HttpSender> HttpSender for Arc<S> {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = std::result::Result<HttpResponse, ConnectionError>> + Send {
        (**self).send(request)
    }
}

/// [`HttpSender`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    /// Default connect and request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Builds a sender whose connections and requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(ReqwestSender { client })
    }

    /// Wraps an already configured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestSender { client }
    }
}

impl HttpSender for ReqwestSender {
    async fn send(
        &self,
        request: &HttpRequest,
    ) -> std::result::Result<HttpResponse, ConnectionError> {
        log::trace!("{} {} {}", request.method, request.url, request.body_text());

        let mut req = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let res = req
            .send()
            .await
            .map_err(|err| ConnectionError(err.to_string()))?;

        let status = res.status();
        let headers = res.headers().clone();

        // letsencrypt sometimes closes the TLS abruptly causing io error
        // even though we did capture the body.
        let body = match res.bytes().await {
            Ok(body) => body.to_vec(),
            Err(err) => {
                log::debug!("Failed to read response body: {err}");
                Vec::new()
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
