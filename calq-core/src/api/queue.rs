//! Delivery queue for outbound API calls
//!
//! Calls are buffered in memory and sent one at a time, in FIFO order, when
//! the queue is flushed. A flush happens automatically once the queue
//! reaches `max_queue_size`.
//!
//! ## Failure handling
//!
//! - No response (connect/DNS/timeout): the call is re-appended to the back
//!   of the queue, up to `max_retries` times, then the flush aborts with
//!   [`Error::DeliveryFailed`]. Retries are immediate, with no backoff.
//! - Non-200 response: never retried. The flush aborts with [`Error::Api`]
//!   and any remaining calls stay queued.
//!
//! A call leaves the queue as soon as it is dequeued for sending, so it can
//! only come back through the retry path.

use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

use super::payload::Properties;
use super::transport::Transport;

/// API endpoint a call is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Track,
    Profile,
    Transfer,
}

impl Endpoint {
    /// Path segment of the endpoint on the API server
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Track => "Track",
            Endpoint::Profile => "Profile",
            Endpoint::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An API call waiting to be sent
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub endpoint: Endpoint,
    pub payload: Properties,
    /// Number of times this call has been re-queued after a transport failure
    pub retry_count: u32,
}

impl PendingCall {
    fn new(endpoint: Endpoint, payload: Properties) -> Self {
        Self {
            endpoint,
            payload,
            retry_count: 0,
        }
    }
}

/// Delivery statistics
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    /// Calls accepted by the server
    pub calls_sent: usize,
    /// Calls re-queued after a transport failure
    pub retries: usize,
    /// Flushes aborted by a fatal error
    pub failures: usize,
}

/// Error body returned by the API for non-200 responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// FIFO queue of API calls bound to one transport
pub struct DeliveryQueue<T: Transport> {
    transport: T,
    config: ApiConfig,
    queue: VecDeque<PendingCall>,
    stats: QueueStats,
}

impl<T: Transport> DeliveryQueue<T> {
    pub fn new(transport: T, config: ApiConfig) -> Self {
        Self {
            transport,
            config,
            queue: VecDeque::new(),
            stats: QueueStats::default(),
        }
    }

    /// Queue a call, flushing first if the size threshold is reached.
    pub fn enqueue(&mut self, endpoint: Endpoint, payload: Properties) -> Result<()> {
        self.queue.push_back(PendingCall::new(endpoint, payload));
        tracing::debug!(
            endpoint = %endpoint,
            queued = self.queue.len(),
            "Queued API call"
        );

        if self.queue.len() >= self.config.max_queue_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Send every queued call in order.
    ///
    /// Returns the number of calls delivered by this flush.
    pub fn flush(&mut self) -> Result<usize> {
        let mut delivered = 0;

        while let Some(mut call) = self.queue.pop_front() {
            // TODO: batch consecutive calls to the same endpoint into one request
            let body = serde_json::to_string(&call.payload)?;
            let url = self.endpoint_url(call.endpoint);

            match self.transport.post(&url, body) {
                Err(e) => {
                    if call.retry_count < self.config.max_retries {
                        call.retry_count += 1;
                        self.stats.retries += 1;
                        tracing::warn!(
                            endpoint = %call.endpoint,
                            attempt = call.retry_count,
                            error = %e,
                            "No response from API server, re-queueing call"
                        );
                        self.queue.push_back(call);
                    } else {
                        self.stats.failures += 1;
                        return Err(Error::DeliveryFailed {
                            host: self.config.host.clone(),
                            endpoint: call.endpoint.to_string(),
                            retries: call.retry_count,
                        });
                    }
                }
                Ok(response) if response.status != 200 => {
                    self.stats.failures += 1;
                    let message = serde_json::from_str::<ApiErrorBody>(&response.body)
                        .map(|b| b.error)
                        .unwrap_or_else(|_| response.body.clone());
                    return Err(Error::Api {
                        status: response.status,
                        message,
                    });
                }
                Ok(_) => {
                    delivered += 1;
                    self.stats.calls_sent += 1;
                    tracing::debug!(
                        endpoint = %call.endpoint,
                        retries = call.retry_count,
                        "Delivered API call"
                    );
                }
            }
        }

        Ok(delivered)
    }

    /// Full URL for an endpoint on the configured host
    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!(
            "{}://{}/{}",
            self.config.scheme(),
            self.config.host,
            endpoint.as_str()
        )
    }

    /// Calls currently waiting to be sent
    pub fn pending(&self) -> impl Iterator<Item = &PendingCall> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
