//! # calq-core
//!
//! Server-side client for the Calq analytics API.
//!
//! This library provides:
//! - A per-request client that tracks actions, identifies visitors and
//!   saves profiles
//! - Session state shared with the Calq browser library through a cookie
//! - An in-memory delivery queue with size-triggered flushes and retries
//! - Configuration and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Request:** headers, parameters and the session cookie ([`session`])
//! - **Session:** visitor identity and global properties ([`SessionState`])
//! - **Delivery:** payloads queued and POSTed to the API server ([`api`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use calq_core::{CalqClient, ClientOptions, MemoryCookieJar, RequestInfo};
//!
//! let request = RequestInfo::new()
//!     .header("User-Agent", "Mozilla/5.0")
//!     .remote_addr("203.0.113.7");
//!
//! let mut calq = CalqClient::from_request(
//!     "55ebeaebfcd351e0b69e6cc99dbb081d",
//!     ClientOptions::default(),
//!     request,
//!     Box::new(MemoryCookieJar::new()),
//! )
//! .expect("failed to create client");
//!
//! calq.track("Product Review", None).expect("failed to track");
//! calq.finish().expect("failed to deliver");
//! ```

// Re-export commonly used items at the crate root
pub use api::{ApiProcessor, Dispatcher, Endpoint, Properties};
pub use config::{ClientOptions, Config};
pub use error::{Error, Result};
pub use session::{
    CalqClient, CookieJar, CookieState, MemoryCookieJar, RequestInfo, RequestScope, SessionState,
};

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
