//! Visitor sessions
//!
//! ## Architecture
//!
//! Identity state lives in a cookie shared with the Calq browser library,
//! so a visitor keeps the same actor across requests and across the
//! server/browser boundary:
//!
//! - [`SessionState`]: anonymous/identified state machine and global properties
//! - [`CookieState`]: the cookie wire format (forward compatible)
//! - [`RequestInfo`]: request signals (user agent, campaign parameters, source IP)
//! - [`CalqClient`]: the facade applications call
//! - [`RequestScope`]: one client per request, passed explicitly
//!
//! ## Usage
//!
//! ```rust,no_run
//! use calq_core::session::{MemoryCookieJar, RequestInfo, RequestScope};
//! use calq_core::ClientOptions;
//!
//! let request = RequestInfo::new().header("User-Agent", "Mozilla/5.0");
//! let mut scope = RequestScope::new(request, MemoryCookieJar::new());
//!
//! let calq = scope
//!     .client("55ebeaebfcd351e0b69e6cc99dbb081d", &ClientOptions::default())
//!     .expect("valid write key");
//! calq.track("Product Review", None).expect("track");
//!
//! scope.finish().expect("delivered");
//! ```

mod client;
mod cookie;
mod request;
mod scope;
mod state;

pub use client::CalqClient;
pub use cookie::{Cookie, CookieJar, CookieState, MemoryCookieJar};
pub use request::{RequestInfo, UNKNOWN_IP};
pub use scope::RequestScope;
pub use state::{new_anonymous_actor, Identity, IdentifyOutcome, SessionState};
