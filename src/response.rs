//! The per-request response sink.
//!
//! A [`ResponseWriter`] is created by dispatch for every request, handed down
//! the middleware chain and into the handler's [`Context`](crate::Context),
//! and turned into the outgoing response once the chain returns. Clones share
//! the same buffer, and that buffer never outlives the request.
//!
//! The whole response is buffered until the chain returns, so headers can
//! be changed at any point. The status is different:
//!
//! - The first [`write_header`](ResponseWriter::write_header) commits the
//!   status. Later calls are ignored.
//! - [`write`](ResponseWriter::write) commits `200 OK` if nothing was
//!   committed yet, then appends to the body.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Context::bytes`](crate::Context::bytes).
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub(crate) fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        })
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Buffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

/// Handle to the response of one in-flight request.
#[derive(Clone, Debug, Default)]
pub struct ResponseWriter {
    inner: Arc<Mutex<Buffer>>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock is never held across an await, and a panic while holding it
    // leaves the buffer in a consistent state.
    fn buffer(&self) -> MutexGuard<'_, Buffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.buffer().headers.insert(name, value);
    }

    /// Adds a header value, keeping existing ones.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.buffer().headers.append(name, value);
    }

    /// Current value of a response header.
    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.buffer().headers.get(name).cloned()
    }

    /// Commits the status code. Only the first call has an effect.
    pub fn write_header(&self, status: StatusCode) {
        let mut buf = self.buffer();
        match buf.status {
            None => buf.status = Some(status),
            Some(committed) => {
                warn!(%committed, ignored = %status, "superfluous write_header call");
            }
        }
    }

    /// Appends to the body, committing `200 OK` first if needed.
    pub fn write(&self, chunk: impl AsRef<[u8]>) {
        let mut buf = self.buffer();
        buf.status.get_or_insert(StatusCode::OK);
        buf.body.extend_from_slice(chunk.as_ref());
    }

    /// The committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.buffer().status
    }

    pub fn is_committed(&self) -> bool {
        self.status().is_some()
    }

    /// Writes `status` with a plain-text body.
    pub(crate) fn write_text(&self, status: StatusCode, body: &str) {
        self.set_header(CONTENT_TYPE, ContentType::Text.header_value());
        self.write_header(status);
        self.write(body);
    }

    /// Discards the status, the body and the content type written so far.
    /// Other headers, such as those set by CORS middleware, are kept.
    pub(crate) fn reset(&self) {
        let mut buf = self.buffer();
        buf.status = None;
        buf.body.clear();
        buf.headers.remove(CONTENT_TYPE);
    }

    /// Drains the buffer into the outgoing response. A response nobody
    /// wrote to is `200 OK` with an empty body.
    pub(crate) fn take_response(&self) -> http::Response<Full<Bytes>> {
        let buf = std::mem::take(&mut *self.buffer());
        let mut res = http::Response::new(Full::new(buf.body.freeze()));
        *res.status_mut() = buf.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = buf.headers;
        res
    }
}

/// A plain-text response produced outside of any route (404, 405, timeouts).
pub(crate) fn text_response(status: StatusCode, body: &str) -> http::Response<Full<Bytes>> {
    let w = ResponseWriter::new();
    w.write_text(status, body);
    w.take_response()
}
