//! Request-scoped client resolution
//!
//! A [`RequestScope`] is created by the host for each incoming request and
//! passed to whatever handles it. It resolves the [`CalqClient`] lazily and
//! hands back the same instance for the rest of the request, so every part
//! of a handler tracks against one visitor without any process-wide state.

use crate::api::{ApiProcessor, Dispatcher};
use crate::config::ClientOptions;
use crate::error::Result;

use super::client::CalqClient;
use super::cookie::CookieJar;
use super::request::RequestInfo;

/// Owns the per-request client and its inputs
pub struct RequestScope<J> {
    request: RequestInfo,
    cookies: J,
    client: Option<CalqClient>,
}

impl<J> RequestScope<J>
where
    J: CookieJar + Clone + Send + 'static,
{
    pub fn new(request: RequestInfo, cookies: J) -> Self {
        Self {
            request,
            cookies,
            client: None,
        }
    }

    /// The client for this request, created over HTTP on first use
    pub fn client(&mut self, write_key: &str, options: &ClientOptions) -> Result<&mut CalqClient> {
        self.client_with(write_key, options, |write_key, options| {
            let api: Box<dyn Dispatcher + Send> =
                Box::new(ApiProcessor::new(write_key, &options.api)?);
            Ok(api)
        })
    }

    /// The client for this request; `make_dispatcher` is only called when
    /// the client is first created
    pub fn client_with<F>(
        &mut self,
        write_key: &str,
        options: &ClientOptions,
        make_dispatcher: F,
    ) -> Result<&mut CalqClient>
    where
        F: FnOnce(&str, &ClientOptions) -> Result<Box<dyn Dispatcher + Send>>,
    {
        let client = match self.client.take() {
            Some(client) => client,
            None => CalqClient::from_request_with_dispatcher(
                write_key,
                options.clone(),
                self.request.clone(),
                Box::new(self.cookies.clone()),
                make_dispatcher(write_key, options)?,
            )?,
        };
        Ok(self.client.insert(client))
    }

    /// Whether a client has been resolved yet
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn cookies(&self) -> &J {
        &self.cookies
    }

    /// End the request: flush the client, if one was created
    pub fn finish(mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.finish(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Properties, Transport, TransportError, TransportResponse};
    use crate::config::ApiConfig;
    use crate::session::cookie::MemoryCookieJar;

    const WRITE_KEY: &str = "55ebeaebfcd351e0b69e6cc99dbb081d";

    struct NullTransport;

    impl Transport for NullTransport {
        fn post(
            &mut self,
            _url: &str,
            _body: String,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Ok(TransportResponse::ok())
        }
    }

    fn null_dispatcher(
        write_key: &str,
        _options: &ClientOptions,
    ) -> Result<Box<dyn Dispatcher + Send>> {
        Ok(Box::new(ApiProcessor::with_transport(
            write_key,
            NullTransport,
            ApiConfig::default(),
        )))
    }

    #[test]
    fn test_same_client_within_request() {
        let mut scope = RequestScope::new(RequestInfo::new(), MemoryCookieJar::new());
        let options = ClientOptions::default();
        assert!(!scope.has_client());

        let first = scope
            .client_with(WRITE_KEY, &options, null_dispatcher)
            .unwrap()
            .actor()
            .to_string();

        let mut created_again = false;
        let second = scope
            .client_with(WRITE_KEY, &options, |k, o| {
                created_again = true;
                null_dispatcher(k, o)
            })
            .unwrap();
        assert_eq!(second.actor(), first);
        assert!(!created_again);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let options = ClientOptions::default();
        let mut a = RequestScope::new(RequestInfo::new(), MemoryCookieJar::new());
        let mut b = RequestScope::new(RequestInfo::new(), MemoryCookieJar::new());

        let actor_a = a
            .client_with(WRITE_KEY, &options, null_dispatcher)
            .unwrap()
            .actor()
            .to_string();
        let actor_b = b
            .client_with(WRITE_KEY, &options, null_dispatcher)
            .unwrap()
            .actor()
            .to_string();
        assert_ne!(actor_a, actor_b);
    }

    #[test]
    fn test_finish_flushes() {
        let options = ClientOptions::default();
        let mut scope = RequestScope::new(RequestInfo::new(), MemoryCookieJar::new());
        let client = scope
            .client_with(WRITE_KEY, &options, null_dispatcher)
            .unwrap();
        client.track("Visit", Some(Properties::new())).unwrap();
        assert_eq!(client.pending(), 1);

        scope.finish().unwrap();
    }
}
