//! Signals read from the incoming HTTP request
//!
//! Web-framework glue fills a [`RequestInfo`] once per request; the client
//! reads the user agent, campaign parameters and the caller's address from
//! it.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Address sent when no valid source IP is known; tells the API not to
/// geolocate the action
pub const UNKNOWN_IP: &str = "none";

/// Headers, parameters and peer address of one request
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Header values keyed by lower-cased name
    headers: HashMap<String, String>,
    /// Query-string parameters
    query: HashMap<String, String>,
    /// Form (POST body) parameters
    form: HashMap<String, String>,
    /// Address of the directly connected peer
    remote_addr: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn form_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.get_header("user-agent")
    }

    /// Request parameter, preferring the form value over the query value
    pub fn param(&self, name: &str) -> Option<&str> {
        self.form
            .get(name)
            .or_else(|| self.query.get(name))
            .map(String::as_str)
    }

    /// Best guess at the caller's address.
    ///
    /// Candidates in order: the last `X-Forwarded-For` entry, `X-Real-IP`,
    /// then the peer address. The first that parses as an IP address wins;
    /// if none do, returns [`UNKNOWN_IP`]. Headers can be spoofed, so this
    /// is only good enough for geolocation.
    pub fn source_ip(&self) -> String {
        let forwarded = self
            .get_header("x-forwarded-for")
            .and_then(|list| list.rsplit(',').next());
        let candidates = [
            forwarded,
            self.get_header("x-real-ip"),
            self.remote_addr.as_deref(),
        ];

        candidates
            .into_iter()
            .flatten()
            .find_map(parse_ip)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_IP.to_string())
    }
}

fn parse_ip(candidate: &str) -> Option<IpAddr> {
    let candidate = candidate.trim();
    candidate
        .parse::<IpAddr>()
        .ok()
        .or_else(|| candidate.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
