//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Uri};

use crate::method::Method;

/// An incoming HTTP request with its body fully buffered.
///
/// Middleware receives it by value and passes it on to the next endpoint;
/// the handler finds it inside its [`Context`](crate::Context).
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: SocketAddr,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        method: Method,
        body: Bytes,
        params: HashMap<String, String>,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
            remote_addr,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: Method, uri: &str) -> Self {
        let (parts, ()) = http::Request::builder()
            .method(method.as_str())
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        Self::new(parts, method, Bytes::new(), HashMap::new(), ([127, 0, 0, 1], 4000).into())
    }

    pub fn method(&self) -> Method { self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// Header lookup. Values that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}
