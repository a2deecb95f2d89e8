//! HTTP transport used by the delivery queue
//!
//! The queue only needs a blocking "POST this JSON body" capability, so the
//! seam is the small [`Transport`] trait. [`ReqwestTransport`] is the default
//! implementation; tests substitute an in-memory fake.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// A response received from the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Plain 200 response with an empty JSON body
    pub fn ok() -> Self {
        Self::new(200, "{}")
    }
}

/// No response was received (DNS, connect or timeout failure)
#[derive(Debug, Clone, thiserror::Error)]
#[error("no response from server: {0}")]
pub struct TransportError(pub String);

/// Blocking HTTP POST capability
pub trait Transport {
    /// POST a JSON `body` to `url`.
    ///
    /// Returns `Err` only when no response was received at all; any HTTP
    /// status, including errors, is an `Ok` response.
    fn post(
        &mut self,
        url: &str,
        body: String,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn post(
        &mut self,
        url: &str,
        body: String,
    ) -> std::result::Result<TransportResponse, TransportError> {
        (**self).post(url, body)
    }
}

/// reqwest-backed transport driven on a private current-thread runtime
///
/// Requests block the calling thread, so this must not be used from inside
/// an async task; run the client on a blocking thread instead.
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl ReqwestTransport {
    /// Create a transport using the timeouts in `config`
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            http_client,
            runtime,
        })
    }
}

impl Transport for ReqwestTransport {
    fn post(
        &mut self,
        url: &str,
        body: String,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let request = self
            .http_client
            .post(url)
            .header(CONTENT_LENGTH, body.len())
            .body(body);

        self.runtime.block_on(async move {
            let response = request
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;

            let status = response.status().as_u16();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(status, error = %e, "Failed to read API response body");
                    unreadable_body(&e)
                }
            };
            Ok(TransportResponse { status, body })
        })
    }
}

/// Stand-in body used when the response arrived but could not be read
fn unreadable_body(error: &impl std::fmt::Display) -> String {
    format!("<unreadable response body: {}>", error)
}
