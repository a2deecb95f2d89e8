//! Integration tests for the calq client, session cookie and delivery queue
//!
//! These tests run whole request flows against an in-memory transport and
//! cookie jar, checking what would have gone over the wire.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use calq_core::api::{ApiProcessor, Transport, TransportError, TransportResponse};
use calq_core::config::{ApiConfig, ClientOptions};
use calq_core::session::{CalqClient, CookieJar, CookieState, MemoryCookieJar, RequestInfo, RequestScope};
use calq_core::{Error, Properties};
use serde_json::{json, Value};

const WRITE_KEY: &str = "55ebeaebfcd351e0b69e6cc99dbb081d";
const COOKIE: &str = "_calq_d";

/// Transport recording every request, answering from a script and then 200
#[derive(Clone, Default)]
struct FakeServer {
    inner: Arc<Mutex<ServerInner>>,
}

#[derive(Default)]
struct ServerInner {
    requests: Vec<(String, Value)>,
    script: VecDeque<Result<TransportResponse, TransportError>>,
}

impl FakeServer {
    fn push(&self, outcome: Result<TransportResponse, TransportError>) {
        self.inner.lock().unwrap().script.push_back(outcome);
    }

    fn fail_connections(&self, times: usize) {
        for _ in 0..times {
            self.push(Err(TransportError("connection timed out".to_string())));
        }
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.inner.lock().unwrap().requests.clone()
    }

    fn endpoints(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|(url, _)| url.rsplit('/').next().unwrap().to_string())
            .collect()
    }
}

impl Transport for FakeServer {
    fn post(&mut self, url: &str, body: String) -> Result<TransportResponse, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .requests
            .push((url.to_string(), serde_json::from_str(&body).unwrap()));
        inner
            .script
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::ok()))
    }
}

fn options() -> ClientOptions {
    ClientOptions::default()
}

fn client_for(
    request: RequestInfo,
    jar: &MemoryCookieJar,
    server: &FakeServer,
    options: ClientOptions,
) -> CalqClient {
    calq_core::logging::init_test();
    let api = ApiProcessor::with_transport(WRITE_KEY, server.clone(), options.api.clone());
    CalqClient::from_request_with_dispatcher(
        WRITE_KEY,
        options,
        request,
        Box::new(jar.clone()),
        Box::new(api),
    )
    .expect("client should resolve")
}

fn cookie_state(jar: &MemoryCookieJar) -> CookieState {
    CookieState::decode(&jar.get(COOKIE).expect("cookie should be set")).expect("cookie decodes")
}

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

// ============================================
// Request resolution
// ============================================

#[test]
fn test_new_visitor_gets_cookie_immediately() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    let client = client_for(RequestInfo::new(), &jar, &server, options());

    let cookie = cookie_state(&jar);
    assert_eq!(cookie.actor, client.actor());
    assert!(cookie.is_anon);
    assert!(!cookie.has_action);
    assert!(uuid::Uuid::parse_str(client.actor()).is_ok());
}

#[test]
fn test_request_signals_become_global_properties() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    let request = RequestInfo::new()
        .header("User-Agent", "Mozilla/5.0 (X11; Linux x86_64)")
        .query_param("utm_source", "from-get")
        .form_param("utm_source", "from-post")
        .query_param("utm_campaign", "spring");

    let client = client_for(request, &jar, &server, options());

    let globals = client.global_properties();
    assert_eq!(globals["$device_agent"], "Mozilla/5.0 (X11; Linux x86_64)");
    assert_eq!(globals["$utm_source"], "from-post");
    assert_eq!(globals["$utm_campaign"], "spring");
    assert!(globals.get("$utm_medium").is_none());
    assert_eq!(cookie_state(&jar).action_global["$utm_campaign"], "spring");
}

#[test]
fn test_existing_cookie_restores_state() {
    let prior = CookieState {
        actor: "user-7".to_string(),
        has_action: true,
        is_anon: false,
        action_global: props(json!({
            "$utm_source": "first-visit",
            "$device_agent": "OldBrowser/1.0",
        })),
        extra: props(json!({ "jsVersion": "2.1" })),
    };
    let jar = MemoryCookieJar::with_cookie(COOKIE, prior.encode());
    let server = FakeServer::default();
    let request = RequestInfo::new()
        .header("User-Agent", "NewBrowser/2.0")
        .query_param("utm_source", "second-visit");

    let client = client_for(request, &jar, &server, options());

    assert_eq!(client.actor(), "user-7");
    assert!(!client.is_anonymous());
    assert!(client.has_tracked());
    // Campaign tags stick to the first visit; the agent follows the request.
    assert_eq!(client.global_properties()["$utm_source"], "first-visit");
    assert_eq!(client.global_properties()["$device_agent"], "NewBrowser/2.0");

    let written = cookie_state(&jar);
    assert_eq!(written.actor, "user-7");
    assert_eq!(written.extra["jsVersion"], "2.1");
}

#[test]
fn test_unreadable_cookie_starts_fresh() {
    let jar = MemoryCookieJar::with_cookie(COOKIE, "%%%definitely-not-base64");
    let server = FakeServer::default();
    let client = client_for(RequestInfo::new(), &jar, &server, options());

    assert!(client.is_anonymous());
    assert!(!client.has_tracked());
    assert!(client.global_properties().is_empty());
    // The bad cookie is only replaced once the state changes.
    assert_eq!(jar.write_count(), 0);
}

#[test]
fn test_cookie_without_actor_is_ignored() {
    let value = base64_json(&json!({
        "isAnon": false,
        "actionGlobal": { "plan": "pro" },
    }));
    let jar = MemoryCookieJar::with_cookie(COOKIE, value);
    let server = FakeServer::default();
    let client = client_for(RequestInfo::new(), &jar, &server, options());

    assert!(client.is_anonymous());
    assert!(client.global_properties().get("plan").is_none());
}

#[test]
fn test_state_persists_between_requests() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();

    let mut first = client_for(RequestInfo::new(), &jar, &server, options());
    first.identify("TestActor123").unwrap();
    first.finish().unwrap();

    let second = client_for(RequestInfo::new(), &jar, &server, options());
    assert_eq!(second.actor(), "TestActor123");
    assert!(!second.is_anonymous());
}

#[test]
fn test_clear_drops_unknown_cookie_fields() {
    let prior = CookieState {
        actor: "user-7".to_string(),
        has_action: false,
        is_anon: false,
        action_global: Properties::new(),
        extra: props(json!({ "legacy": true })),
    };
    let jar = MemoryCookieJar::with_cookie(COOKIE, prior.encode());
    let server = FakeServer::default();
    let mut client = client_for(RequestInfo::new(), &jar, &server, options());

    client.clear().unwrap();

    let written = cookie_state(&jar);
    assert_ne!(written.actor, "user-7");
    assert!(written.is_anon);
    assert!(written.extra.is_empty());
}

// ============================================
// Delivery
// ============================================

#[test]
fn test_end_to_end_calls() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    let request = RequestInfo::new().header("X-Forwarded-For", "203.0.113.9");
    let mut client = client_for(request, &jar, &server, options());
    let anon = client.actor().to_string();

    client.track("Test Action (Anon)", None).unwrap();
    client.identify("TestActor1").unwrap();
    client.track("Test Action", None).unwrap();
    client.track_sale("Test Sale", None, "USD", 9.99).unwrap();
    client
        .profile(props(json!({ "$email": "test@notarealemail.com" })))
        .unwrap();
    assert!(server.requests().is_empty());

    client.finish().unwrap();

    assert_eq!(
        server.endpoints(),
        vec!["Track", "Transfer", "Track", "Track", "Profile"]
    );
    let requests = server.requests();
    assert_eq!(requests[0].0, "http://api.calq.io/Track");

    let first = &requests[0].1;
    assert_eq!(first["actor"], anon.as_str());
    assert_eq!(first["action_name"], "Test Action (Anon)");
    assert_eq!(first["write_key"], WRITE_KEY);
    assert_eq!(first["ip_address"], "203.0.113.9");
    assert!(first["timestamp"].is_string());
    assert!(first["properties"].is_object());

    assert_eq!(requests[1].1["old_actor"], anon.as_str());
    assert_eq!(requests[1].1["new_actor"], "TestActor1");

    let sale = &requests[3].1["properties"];
    assert_eq!(sale["$sale_currency"], "USD");
    assert_eq!(sale["$sale_value"], 9.99);

    assert_eq!(requests[4].1["actor"], "TestActor1");
    assert_eq!(requests[4].1["properties"]["$email"], "test@notarealemail.com");
}

#[test]
fn test_identify_without_tracking_sends_no_transfer() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    let mut client = client_for(RequestInfo::new(), &jar, &server, options());

    client.identify("user-1").unwrap();
    client.track("After Login", None).unwrap();
    client.finish().unwrap();

    assert_eq!(server.endpoints(), vec!["Track"]);
}

#[test]
fn test_identify_persists_even_when_transfer_flush_fails() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    server.push(Ok(TransportResponse::new(
        401,
        r#"{"error":"Unknown write key"}"#,
    )));
    let options = ClientOptions {
        api: ApiConfig {
            max_queue_size: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut client = client_for(RequestInfo::new(), &jar, &server, options);

    client.track("Before Login", None).unwrap();
    // Queueing the transfer fills the queue; the flush hits the 401.
    let err = client.identify("user-1").unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }));

    assert_eq!(client.actor(), "user-1");
    assert!(!client.is_anonymous());
    let state = cookie_state(&jar);
    assert_eq!(state.actor, "user-1");
    assert!(!state.is_anon);

    // The transfer is still queued for the next flush.
    assert_eq!(client.pending(), 1);
    client.identify("user-1").unwrap();
    client.finish().unwrap();
    assert_eq!(server.endpoints(), vec!["Track", "Transfer"]);
}

#[test]
fn test_queue_threshold_flushes_without_manual_flush() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    let options = ClientOptions {
        api: ApiConfig {
            max_queue_size: 3,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut client = client_for(RequestInfo::new(), &jar, &server, options);

    client.track("One", None).unwrap();
    client.track("Two", None).unwrap();
    assert!(server.requests().is_empty());
    client.track("Three", None).unwrap();

    assert_eq!(server.requests().len(), 3);
    assert_eq!(client.pending(), 0);
}

#[test]
fn test_drop_flushes_pending_calls() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    {
        let mut client = client_for(RequestInfo::new(), &jar, &server, options());
        client.track("Dropped", None).unwrap();
    }
    assert_eq!(server.endpoints(), vec!["Track"]);
}

#[test]
fn test_transient_failures_are_retried() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    server.fail_connections(5);
    let mut client = client_for(RequestInfo::new(), &jar, &server, options());

    client.track("Flaky", None).unwrap();
    client.finish().unwrap();

    assert_eq!(server.requests().len(), 6);
}

#[test]
fn test_exhausted_retries_fail_the_flush() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    server.fail_connections(6);
    let mut client = client_for(RequestInfo::new(), &jar, &server, options());

    client.track("Unreachable", None).unwrap();
    match client.flush() {
        Err(Error::DeliveryFailed { host, retries, .. }) => {
            assert_eq!(host, "api.calq.io");
            assert_eq!(retries, 5);
        }
        other => panic!("expected DeliveryFailed, got {:?}", other),
    }
    assert_eq!(client.pending(), 0);
}

#[test]
fn test_server_error_is_surfaced() {
    let jar = MemoryCookieJar::new();
    let server = FakeServer::default();
    server.push(Ok(TransportResponse::new(
        401,
        r#"{"error":"Unknown write key"}"#,
    )));
    let mut client = client_for(RequestInfo::new(), &jar, &server, options());

    client.track("Rejected", None).unwrap();
    let err = client.finish().unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, ref message } if message == "Unknown write key"));
    assert_eq!(server.requests().len(), 1);
}

// ============================================
// Request scope
// ============================================

#[test]
fn test_request_scope_resolves_once() {
    let server = FakeServer::default();
    let jar = MemoryCookieJar::new();
    let mut scope = RequestScope::new(RequestInfo::new(), jar.clone());
    let make = |key: &str, options: &ClientOptions| -> calq_core::Result<Box<dyn calq_core::Dispatcher + Send>> {
        Ok(Box::new(ApiProcessor::with_transport(
            key,
            server.clone(),
            options.api.clone(),
        )))
    };

    scope
        .client_with(WRITE_KEY, &options(), make)
        .unwrap()
        .track("First", None)
        .unwrap();
    scope
        .client_with(WRITE_KEY, &options(), make)
        .unwrap()
        .identify("user-1")
        .unwrap();
    scope.finish().unwrap();

    // One visitor: the anonymous track is transferred to the identified user.
    assert_eq!(server.endpoints(), vec!["Track", "Transfer"]);
    assert_eq!(cookie_state(&jar).actor, "user-1");
}

fn base64_json(value: &Value) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(value.to_string())
}
