//! CORS presets.
//!
//! Both presets set the same four response headers on every request and
//! answer `OPTIONS` preflights themselves with `200 OK` and an empty body,
//! without calling the rest of the chain.

use std::sync::Arc;

use http::StatusCode;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue,
};

use super::{Middleware, from_fn};
use crate::error::Error;
use crate::handler::Endpoint;
use crate::method::Method;
use crate::request::Request;
use crate::response::ResponseWriter;

pub const FLEXIBLE_ORIGIN: &str = "*";
pub const FLEXIBLE_ALLOW_CREDENTIALS: &str = "true";
pub const FLEXIBLE_ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, PATCH, TRACE, HEAD";
pub const FLEXIBLE_ALLOW_HEADERS: &str = "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, \
    Authorization, accept, origin, Cache-Control, X-Requested-With";

/// Explicit CORS rules. Every field is sent verbatim as a header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cors {
    pub origin: String,
    pub methods: String,
    pub allow_headers: String,
    pub allow_credentials: String,
}

impl Cors {
    /// The rules [`flexible_cors`] applies.
    pub fn flexible() -> Self {
        Self {
            origin: FLEXIBLE_ORIGIN.to_owned(),
            methods: FLEXIBLE_ALLOW_METHODS.to_owned(),
            allow_headers: FLEXIBLE_ALLOW_HEADERS.to_owned(),
            allow_credentials: FLEXIBLE_ALLOW_CREDENTIALS.to_owned(),
        }
    }
}

/// Strict CORS middleware with caller-supplied rules.
///
/// Fails if any rule is not a valid header value.
pub fn cors(rules: &Cors) -> Result<Middleware, Error> {
    let headers = CorsHeaders {
        origin: HeaderValue::from_str(&rules.origin)?,
        credentials: HeaderValue::from_str(&rules.allow_credentials)?,
        allow_headers: HeaderValue::from_str(&rules.allow_headers)?,
        methods: HeaderValue::from_str(&rules.methods)?,
    };
    Ok(headers.into_middleware())
}

/// Permissive CORS middleware: any origin, credentials allowed, every
/// standard verb.
pub fn flexible_cors() -> Middleware {
    CorsHeaders {
        origin: HeaderValue::from_static(FLEXIBLE_ORIGIN),
        credentials: HeaderValue::from_static(FLEXIBLE_ALLOW_CREDENTIALS),
        allow_headers: HeaderValue::from_static(FLEXIBLE_ALLOW_HEADERS),
        methods: HeaderValue::from_static(FLEXIBLE_ALLOW_METHODS),
    }
    .into_middleware()
}

struct CorsHeaders {
    origin: HeaderValue,
    credentials: HeaderValue,
    allow_headers: HeaderValue,
    methods: HeaderValue,
}

impl CorsHeaders {
    fn apply(&self, w: &ResponseWriter) {
        w.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        w.set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS, self.credentials.clone());
        w.set_header(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        w.set_header(ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
    }

    fn into_middleware(self) -> Middleware {
        let headers = Arc::new(self);
        from_fn(move |w: ResponseWriter, req: Request, next: Endpoint| {
            let headers = Arc::clone(&headers);
            async move {
                headers.apply(&w);
                if req.method() == Method::Options {
                    w.write_header(StatusCode::OK);
                    return;
                }
                next.call(w, req).await;
            }
        })
    }
}
