//! Per-visitor client: the main entry point of the SDK
//!
//! A [`CalqClient`] tracks actions for one visitor within one request. API
//! calls are queued in memory and sent when the client is finished or
//! dropped, or earlier if the queue fills up. Identity changes are written
//! back to the session cookie so the next request (or the browser library)
//! picks them up.

use serde_json::Value;

use crate::api::{reserved, ApiProcessor, Dispatcher, Properties};
use crate::config::{validate_write_key, ClientOptions, CookieConfig};
use crate::error::{Error, Result};

use super::cookie::{Cookie, CookieJar, CookieState};
use super::request::RequestInfo;
use super::state::{new_anonymous_actor, Identity, IdentifyOutcome, SessionState};

/// Tracks actions and identity for one visitor
pub struct CalqClient {
    state: SessionState,
    cookie: CookieConfig,
    cookies: Box<dyn CookieJar + Send>,
    api: Box<dyn Dispatcher + Send>,
    request: RequestInfo,
    /// Set by `finish`; the drop-time flush is skipped afterwards
    finished: bool,
}

impl std::fmt::Debug for CalqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalqClient")
            .field("state", &self.state)
            .field("cookie", &self.cookie)
            .field("pending", &self.api.pending())
            .finish()
    }
}

impl CalqClient {
    /// Create a client for `actor` that delivers over HTTP.
    ///
    /// The client starts anonymous. Prefer [`CalqClient::from_request`],
    /// which restores state from the session cookie.
    pub fn new(
        actor: impl Into<String>,
        write_key: &str,
        options: ClientOptions,
        cookies: Box<dyn CookieJar + Send>,
    ) -> Result<Self> {
        validate_write_key(write_key)?;
        let api = ApiProcessor::new(write_key, &options.api)?;
        Self::with_dispatcher(actor, write_key, options, cookies, Box::new(api))
    }

    /// Create a client that hands its API calls to `api`
    pub fn with_dispatcher(
        actor: impl Into<String>,
        write_key: &str,
        options: ClientOptions,
        cookies: Box<dyn CookieJar + Send>,
        api: Box<dyn Dispatcher + Send>,
    ) -> Result<Self> {
        validate_write_key(write_key)?;
        options.cookie.validate()?;
        let state = SessionState::anonymous(actor)?;

        Ok(Self {
            state,
            cookie: options.cookie,
            cookies,
            api,
            request: RequestInfo::default(),
            finished: false,
        })
    }

    /// Create a client for the visitor making `request`, delivering over
    /// HTTP.
    pub fn from_request(
        write_key: &str,
        options: ClientOptions,
        request: RequestInfo,
        cookies: Box<dyn CookieJar + Send>,
    ) -> Result<Self> {
        validate_write_key(write_key)?;
        let api = ApiProcessor::new(write_key, &options.api)?;
        Self::from_request_with_dispatcher(write_key, options, request, cookies, Box::new(api))
    }

    /// Create a client for the visitor making `request`.
    ///
    /// State is read from the session cookie when present; otherwise the
    /// visitor gets a fresh anonymous id, written out immediately. Request
    /// signals (user agent, campaign parameters) are then merged into the
    /// global properties.
    pub fn from_request_with_dispatcher(
        write_key: &str,
        options: ClientOptions,
        request: RequestInfo,
        cookies: Box<dyn CookieJar + Send>,
        api: Box<dyn Dispatcher + Send>,
    ) -> Result<Self> {
        let mut client =
            Self::with_dispatcher(new_anonymous_actor(), write_key, options, cookies, api)?;

        match client.cookies.get(&client.cookie.name) {
            Some(value) => {
                client.parse_cookie_state(&value);
            }
            None => client.write_cookie_state()?,
        }

        client.request = request;
        client.parse_request_state()?;

        tracing::debug!(
            actor = %client.state.actor(),
            anonymous = client.state.is_anonymous(),
            "Resolved Calq client for request"
        );
        Ok(client)
    }

    /// Load state from a cookie value. Returns false (leaving the client
    /// untouched) if the value is unreadable.
    pub fn parse_cookie_state(&mut self, value: &str) -> bool {
        match CookieState::decode(value) {
            Some(cookie) => {
                self.state = SessionState::from_cookie(cookie);
                true
            }
            None => {
                tracing::debug!(
                    cookie = %self.cookie.name,
                    "Unreadable session cookie, treating visitor as new"
                );
                false
            }
        }
    }

    /// Merge signals from the current request into the global properties.
    ///
    /// The user agent is always overwritten; campaign parameters are only
    /// set when not already present.
    pub fn parse_request_state(&mut self) -> Result<()> {
        if let Some(agent) = self.request.user_agent().map(str::to_string) {
            self.set_global_property(reserved::action::DEVICE_AGENT, Value::from(agent))?;
        }

        for (reserved_key, param) in reserved::UTM_PARAMETERS {
            if self.state.global_properties().contains_key(reserved_key) {
                continue;
            }
            if let Some(value) = self.request.param(param).map(str::to_string) {
                self.set_global_property(reserved_key, Value::from(value))?;
            }
        }
        Ok(())
    }

    /// Write the current state to the session cookie
    pub fn write_cookie_state(&mut self) -> Result<()> {
        if self.cookies.headers_sent() {
            return Err(Error::HeadersSent {
                name: self.cookie.name.clone(),
            });
        }
        let value = self.state.to_cookie().encode();
        self.cookies.set(Cookie::session(&self.cookie, value)?);
        Ok(())
    }

    /// Track an action for this visitor.
    ///
    /// Global properties are sent along, with `properties` winning on
    /// conflicting keys.
    pub fn track(&mut self, action: &str, properties: Option<Properties>) -> Result<()> {
        let mut merged = self.state.global_properties().clone();
        if let Some(properties) = properties {
            merged.extend(properties);
        }

        let mut api_props = Properties::new();
        api_props.insert(
            reserved::api::IP_ADDRESS.to_string(),
            Value::from(self.request.source_ip()),
        );

        self.api
            .track(self.state.actor(), action, Some(api_props), Some(merged))?;

        if self.state.mark_tracked() {
            self.write_cookie_state()?;
        }
        Ok(())
    }

    /// Track an action carrying a monetary value.
    ///
    /// `currency` must be a 3 letter code (fictional or otherwise).
    pub fn track_sale(
        &mut self,
        action: &str,
        properties: Option<Properties>,
        currency: &str,
        amount: f64,
    ) -> Result<()> {
        if currency.chars().count() != 3 {
            return Err(Error::validation(
                "currency must be a 3 letter currency code (fictional or otherwise)",
            ));
        }

        let mut properties = properties.unwrap_or_default();
        properties.insert(
            reserved::action::SALE_CURRENCY.to_string(),
            Value::from(currency),
        );
        properties.insert(reserved::action::SALE_VALUE.to_string(), Value::from(amount));

        self.track(action, Some(properties))
    }

    /// Set a property sent with every subsequent action. The cookie is only
    /// rewritten when the value changes.
    pub fn set_global_property(&mut self, key: &str, value: Value) -> Result<()> {
        if self.state.set_global_property(key, value)? {
            self.write_cookie_state()?;
        }
        Ok(())
    }

    /// Name this visitor, e.g. after sign-in.
    ///
    /// Actions tracked while anonymous are transferred to `actor`. A session
    /// can only be identified once; call [`CalqClient::clear`] first to
    /// switch to another user.
    ///
    /// The transfer call is queued before the identity switches. If queueing
    /// it triggers a flush that fails, the new identity is still written to
    /// the cookie and the delivery error is returned afterwards.
    pub fn identify(&mut self, actor: &str) -> Result<()> {
        let IdentifyOutcome::Identified { previous, transfer } =
            self.state.check_identify(actor)?
        else {
            return Ok(());
        };

        let delivery = if transfer {
            self.api.transfer(&previous, actor)
        } else {
            Ok(())
        };

        self.state.apply_identify(actor);
        tracing::debug!(from = %previous, to = %actor, transfer, "Identified actor");
        self.write_cookie_state()?;
        delivery
    }

    /// Save profile properties for this (identified) visitor
    pub fn profile(&mut self, properties: Properties) -> Result<()> {
        if properties.is_empty() {
            return Err(Error::validation("profile() needs at least one property"));
        }
        if self.state.identity() == Identity::Anonymous {
            return Err(Error::ProfileWhileAnonymous);
        }
        self.api.profile(self.state.actor(), properties)
    }

    /// Reset to a brand new anonymous visitor
    pub fn clear(&mut self) -> Result<()> {
        self.state.clear(new_anonymous_actor());
        self.write_cookie_state()
    }

    /// Send any queued API calls now
    pub fn flush(&mut self) -> Result<()> {
        self.api.flush()
    }

    /// Flush and dispose of the client, reporting delivery errors
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.api.flush()
    }

    pub fn actor(&self) -> &str {
        self.state.actor()
    }

    pub fn is_anonymous(&self) -> bool {
        self.state.is_anonymous()
    }

    pub fn has_tracked(&self) -> bool {
        self.state.has_tracked()
    }

    pub fn global_properties(&self) -> &Properties {
        self.state.global_properties()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Number of API calls waiting to be sent
    pub fn pending(&self) -> usize {
        self.api.pending()
    }
}

impl Drop for CalqClient {
    fn drop(&mut self) {
        if self.finished || self.api.pending() == 0 {
            return;
        }
        if let Err(e) = self.api.flush() {
            tracing::error!(
                actor = %self.state.actor(),
                error = %e,
                "Failed to flush Calq API calls when dropping client"
            );
        }
    }
}
