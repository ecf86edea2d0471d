//! Per-request handler context.

use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{BoxError, Error, HandlerError};
use crate::request::Request;
use crate::response::{ContentType, ResponseWriter};

/// Everything a handler needs for one request: the request itself and the
/// writer for its response.
///
/// Dispatch builds a fresh `Context` for every request and moves it into the
/// handler, so two requests never see each other's data.
#[derive(Debug)]
pub struct Context {
    writer: ResponseWriter,
    request: Request,
}

impl Context {
    pub(crate) fn new(writer: ResponseWriter, request: Request) -> Self {
        Self { writer, request }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn writer(&self) -> &ResponseWriter { &self.writer }

    pub fn into_parts(self) -> (ResponseWriter, Request) {
        (self.writer, self.request)
    }

    /// Shorthand for [`Request::param`].
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }

    /// Shorthand for [`Request::header`].
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Serializes `value` as the JSON response body.
    ///
    /// The value is encoded before anything is written, so a failure leaves
    /// the response untouched.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value).map_err(Error::Serialization)?;
        self.bytes(ContentType::Json, body);
        Ok(())
    }

    /// Decodes the request body as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(self.request.body()).map_err(Error::Decode)
    }

    /// Writes a `text/plain` body.
    pub fn text(&self, body: impl AsRef<str>) {
        self.bytes(ContentType::Text, body.as_ref());
    }

    pub fn bytes(&self, content_type: ContentType, body: impl AsRef<[u8]>) {
        self.writer.set_header(CONTENT_TYPE, content_type.header_value());
        self.writer.write(body);
    }

    /// Commits a status code without a body.
    pub fn status(&self, status: StatusCode) {
        self.writer.write_header(status);
    }

    /// Pairs `err` with the status dispatch should answer with. Nothing is
    /// written here; return the value from the handler.
    pub fn fail(&self, err: impl Into<BoxError>, status: StatusCode) -> HandlerError {
        HandlerError::with_status(err, status)
    }
}
