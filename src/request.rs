//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use tokio_util::sync::CancellationToken;

/// An incoming HTTP request, owned by exactly one in-flight task.
///
/// The request travels inward through the middleware chain by value; a stage
/// that wants to mutate headers or swap the cancellation scope does so before
/// delegating to the next stage.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    params: HashMap<String, String>,
    cancel: CancellationToken,
}

impl Request {
    /// Creates a request with empty headers and body and a fresh cancellation
    /// scope. The usual entry point for tests and hand-driven pipelines; the
    /// server fills in the rest via the setters.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            params: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// The buffered request body length.
    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }

    /// The request authority: the `Host` header, falling back to the URI
    /// authority for absolute-form requests.
    pub fn host(&self) -> &str {
        self.header("host")
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// Path plus query, as sent on the request line.
    pub fn request_uri(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// Case-insensitive single-value header lookup; non-UTF-8 values read as
    /// absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter captured by the router.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The request's cancellation scope. Cancellation is advisory: handlers
    /// that never look at it simply keep running.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Replaces the cancellation scope, typically with a child of the current
    /// one so an enclosing stage can cancel everything further in.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr: Some(remote_addr),
            params: HashMap::new(),
            cancel,
        }
    }
}
