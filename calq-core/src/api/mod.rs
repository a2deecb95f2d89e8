//! Calq API delivery
//!
//! Everything between a session and the network:
//!
//! - [`reserved`]: property names the API reserves
//! - [`PayloadBuilder`]: request bodies for Track, Profile and Transfer
//! - [`DeliveryQueue`]: FIFO buffering, size-triggered flushes and retries
//! - [`Transport`]: the blocking HTTP POST seam
//! - [`ApiProcessor`]: the default [`Dispatcher`] gluing the above together
//!
//! The queue knows nothing about sessions or identity; it only sees
//! endpoints and payload maps.

mod payload;
mod processor;
mod queue;
pub mod reserved;
mod transport;

pub use payload::{PayloadBuilder, Properties};
pub use processor::{ApiProcessor, Dispatcher};
pub use queue::{DeliveryQueue, Endpoint, PendingCall, QueueStats};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};
