//! Middleware layer.
//!
//! A [`Middleware`] takes the next [`Endpoint`] and returns a new one that
//! runs its own logic around it. Cross-cutting concerns such as CORS and
//! request logging live here.
//!
//! Middleware registered first is outermost: its pre-logic runs first and its
//! post-logic runs last. A middleware short-circuits by writing a response
//! and not calling `next`.
//!
//! ```rust
//! use umi::{Endpoint, Request, ResponseWriter, middleware};
//!
//! let timing = middleware::from_fn(|w: ResponseWriter, req: Request, next: Endpoint| async move {
//!     let started = std::time::Instant::now();
//!     next.call(w, req).await;
//!     tracing::debug!(elapsed = ?started.elapsed(), "done");
//! });
//! ```

mod cors;
mod logger;

use std::future::Future;
use std::sync::Arc;

use crate::handler::Endpoint;
use crate::request::Request;
use crate::response::ResponseWriter;

pub use cors::{
    Cors, FLEXIBLE_ALLOW_CREDENTIALS, FLEXIBLE_ALLOW_HEADERS, FLEXIBLE_ALLOW_METHODS,
    FLEXIBLE_ORIGIN, cors, flexible_cors,
};
pub use logger::logger;

/// An endpoint-to-endpoint wrapper.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync + 'static>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wraps `next`, returning the combined endpoint.
    pub fn wrap(&self, next: Endpoint) -> Endpoint {
        (self.0)(next)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Composes `middleware` into one: `[m1, m2, m3]` wraps an endpoint `h` as
/// `m1(m2(m3(h)))`.
pub fn chain(middleware: &[Middleware]) -> Middleware {
    let middleware = middleware.to_vec();
    Middleware::new(move |endpoint| {
        middleware
            .iter()
            .rev()
            .fold(endpoint, |next, m| m.wrap(next))
    })
}

/// Builds a middleware from an async function receiving the writer, the
/// request and the next endpoint.
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(ResponseWriter, Request, Endpoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let f = Arc::new(f);
    Middleware::new(move |next: Endpoint| {
        let f = Arc::clone(&f);
        Endpoint::new(move |w: ResponseWriter, req: Request| f(w, req, next.clone()))
    })
}
