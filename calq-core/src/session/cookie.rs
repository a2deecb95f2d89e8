//! Session cookie codec and cookie capability
//!
//! The cookie is shared with the Calq browser library, so the format must
//! not change without changing both sides. The value is base64 of a JSON
//! object:
//!
//! ```text
//! {
//!     "actor": "some_id",
//!     "hasAction": true,
//!     "isAnon": true,
//!     "actionGlobal": { "someGlobalProperty": "someValue" }
//! }
//! ```
//!
//! Fields this library does not know about are kept in [`CookieState::extra`]
//! and written back unchanged, under the four known fields.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::api::Properties;
use crate::config::CookieConfig;
use crate::error::{Error, Result};

const ACTOR: &str = "actor";
const HAS_ACTION: &str = "hasAction";
const IS_ANON: &str = "isAnon";
const ACTION_GLOBAL: &str = "actionGlobal";

/// Decoded contents of the session cookie
#[derive(Debug, Clone, PartialEq)]
pub struct CookieState {
    pub actor: String,
    pub has_action: bool,
    pub is_anon: bool,
    pub action_global: Properties,
    /// Unknown fields, preserved verbatim
    pub extra: Properties,
}

impl CookieState {
    /// Encode as the cookie value (URL-safe base64 of JSON)
    pub fn encode(&self) -> String {
        let mut json = self.extra.clone();
        json.insert(ACTOR.into(), Value::from(self.actor.as_str()));
        json.insert(HAS_ACTION.into(), Value::Bool(self.has_action));
        json.insert(IS_ANON.into(), Value::Bool(self.is_anon));
        json.insert(ACTION_GLOBAL.into(), Value::Object(self.action_global.clone()));

        URL_SAFE.encode(Value::Object(json).to_string())
    }

    /// Decode a cookie value.
    ///
    /// Returns `None` when the value is not base64, not a JSON object, or has
    /// no non-empty `actor`; the caller then treats the visitor as new.
    /// Accepts both base64 alphabets, with or without padding, and
    /// percent-encoded values.
    pub fn decode(value: &str) -> Option<Self> {
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        let value = value.trim();

        let bytes = [&URL_SAFE, &STANDARD, &URL_SAFE_NO_PAD, &STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(value).ok())?;

        let mut json = match serde_json::from_slice::<Value>(&bytes).ok()? {
            Value::Object(map) if !map.is_empty() => map,
            _ => return None,
        };

        // Without a recognised actor the rest cannot be trusted to belong to
        // this visitor.
        let actor = match json.get(ACTOR) {
            Some(Value::String(actor)) if !actor.is_empty() => actor.clone(),
            _ => return None,
        };

        let has_action = json.get(HAS_ACTION).and_then(Value::as_bool).unwrap_or(false);
        let is_anon = json.get(IS_ANON).and_then(Value::as_bool).unwrap_or(true);
        let action_global = match json.get(ACTION_GLOBAL) {
            Some(Value::Object(map)) => map.clone(),
            _ => Properties::new(),
        };

        for key in [ACTOR, HAS_ACTION, IS_ANON, ACTION_GLOBAL] {
            json.remove(key);
        }

        Some(Self {
            actor,
            has_action,
            is_anon,
            action_global,
            extra: json,
        })
    }
}

/// A cookie to be sent back to the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: Option<String>,
    pub expires: DateTime<Utc>,
}

impl Cookie {
    /// Build the session cookie for `value` using `config`
    pub fn session(config: &CookieConfig, value: String) -> Result<Self> {
        let expires = Duration::try_days(config.expires_days)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::Config(format!(
                    "cookie.expires_days out of range: {}",
                    config.expires_days
                ))
            })?;

        Ok(Self {
            name: config.name.clone(),
            value,
            path: "/".to_string(),
            domain: config.domain.clone(),
            expires,
        })
    }

    /// Render as a `Set-Cookie` header value
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Expires={}; Path={}",
            self.name,
            urlencoding::encode(&self.value),
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.path
        );
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        header
    }
}

/// Cookie access for the current request.
///
/// Implemented by web-framework glue; [`MemoryCookieJar`] is a ready-made
/// in-memory implementation.
pub trait CookieJar {
    /// Value of the named cookie, if present
    fn get(&self, name: &str) -> Option<String>;

    /// Whether response headers have already been sent, after which no
    /// cookie can be set
    fn headers_sent(&self) -> bool;

    /// Queue a cookie on the response
    fn set(&mut self, cookie: Cookie);
}

impl<J: CookieJar + ?Sized> CookieJar for Box<J> {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn headers_sent(&self) -> bool {
        (**self).headers_sent()
    }

    fn set(&mut self, cookie: Cookie) {
        (**self).set(cookie)
    }
}

/// In-memory cookie jar.
///
/// Clones share the same storage, so a host can hand one clone to a client
/// and read the written cookies back from another. Written cookies are
/// visible to `get`, as they would be on the next request.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    inner: Arc<Mutex<JarInner>>,
}

#[derive(Debug, Default)]
struct JarInner {
    incoming: HashMap<String, String>,
    written: Vec<Cookie>,
    headers_sent: bool,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar holding one incoming cookie
    pub fn with_cookie(name: impl Into<String>, value: impl Into<String>) -> Self {
        let jar = Self::new();
        jar.lock().incoming.insert(name.into(), value.into());
        jar
    }

    fn lock(&self) -> MutexGuard<'_, JarInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate the response having started
    pub fn mark_headers_sent(&self) {
        self.lock().headers_sent = true;
    }

    /// Most recent cookie written under `name`
    pub fn written(&self, name: &str) -> Option<Cookie> {
        self.lock()
            .written
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Number of cookie writes so far
    pub fn write_count(&self) -> usize {
        self.lock().written.len()
    }

    /// `Set-Cookie` header values for the latest write of each cookie
    pub fn set_cookie_headers(&self) -> Vec<String> {
        let inner = self.lock();
        let mut latest: Vec<&Cookie> = Vec::new();
        for cookie in inner.written.iter().rev() {
            if !latest.iter().any(|c| c.name == cookie.name) {
                latest.push(cookie);
            }
        }
        latest.iter().rev().map(|c| c.to_header_value()).collect()
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let inner = self.lock();
        inner
            .written
            .iter()
            .rev()
            .find(|c| c.name == name)
            .map(|c| c.value.clone())
            .or_else(|| inner.incoming.get(name).cloned())
    }

    fn headers_sent(&self) -> bool {
        self.lock().headers_sent
    }

    fn set(&mut self, cookie: Cookie) {
        self.lock().written.push(cookie);
    }
}
