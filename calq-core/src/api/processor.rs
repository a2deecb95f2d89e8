//! Dispatches API calls built from session data onto the delivery queue

use crate::config::ApiConfig;
use crate::error::Result;

use super::payload::{PayloadBuilder, Properties};
use super::queue::{DeliveryQueue, Endpoint, QueueStats};
use super::transport::{ReqwestTransport, Transport};

/// Sink for the API calls a session produces.
///
/// [`ApiProcessor`] is the standard implementation; a client can be given
/// any other implementation for testing or custom delivery.
pub trait Dispatcher {
    /// Record `action` for `actor`.
    fn track(
        &mut self,
        actor: &str,
        action: &str,
        api_props: Option<Properties>,
        user_props: Option<Properties>,
    ) -> Result<()>;

    /// Save profile properties for `actor`.
    fn profile(&mut self, actor: &str, user_props: Properties) -> Result<()>;

    /// Merge the history of `old_actor` into `new_actor`.
    fn transfer(&mut self, old_actor: &str, new_actor: &str) -> Result<()>;

    /// Send everything queued so far.
    fn flush(&mut self) -> Result<()>;

    /// Number of calls not yet sent.
    fn pending(&self) -> usize;
}

/// Builds payloads for one write key and queues them for delivery
pub struct ApiProcessor<T: Transport> {
    builder: PayloadBuilder,
    queue: DeliveryQueue<T>,
}

impl ApiProcessor<ReqwestTransport> {
    /// Create a processor that delivers over HTTP
    pub fn new(write_key: impl Into<String>, config: &ApiConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(write_key, transport, config.clone()))
    }
}

impl<T: Transport> ApiProcessor<T> {
    pub fn with_transport(write_key: impl Into<String>, transport: T, config: ApiConfig) -> Self {
        Self {
            builder: PayloadBuilder::new(write_key),
            queue: DeliveryQueue::new(transport, config),
        }
    }

    pub fn queue(&self) -> &DeliveryQueue<T> {
        &self.queue
    }

    pub fn stats(&self) -> &QueueStats {
        self.queue.stats()
    }
}

impl<T: Transport> Dispatcher for ApiProcessor<T> {
    fn track(
        &mut self,
        actor: &str,
        action: &str,
        api_props: Option<Properties>,
        user_props: Option<Properties>,
    ) -> Result<()> {
        let payload = self
            .builder
            .build_track(actor, action, api_props, user_props)?;
        self.queue.enqueue(Endpoint::Track, payload)
    }

    fn profile(&mut self, actor: &str, user_props: Properties) -> Result<()> {
        let payload = self.builder.build_profile(actor, user_props)?;
        self.queue.enqueue(Endpoint::Profile, payload)
    }

    fn transfer(&mut self, old_actor: &str, new_actor: &str) -> Result<()> {
        let payload = self.builder.build_transfer(old_actor, new_actor)?;
        self.queue.enqueue(Endpoint::Transfer, payload)
    }

    fn flush(&mut self) -> Result<()> {
        self.queue.flush().map(|_| ())
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
