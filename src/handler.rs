//! Handler trait, endpoints and type erasure.
//!
//! # Two handler shapes
//!
//! Users write **handlers**: `async fn(Context) -> Result<(), E>`. Middleware
//! wraps **endpoints**: the raw `(ResponseWriter, Request)` shape with no
//! return value. The router bridges the two once per route, at registration:
//!
//! ```text
//! async fn hello(ctx: Context) -> Result<(), HandlerError>  ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                    ← Handler blanket impl
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! Endpoint (error translation around the handler)
//!        ↓  wrapped by the middleware snapshot
//! endpoint.call(writer, req)  at request time   ← one vtable dispatch per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerError;
use crate::request::Request;
use crate::response::ResponseWriter;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across worker threads.
#[doc(hidden)]
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<Result<(), HandlerError>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(ctx: Context) -> Result<(), E>   where E: Into<HandlerError>
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, E> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
{
}

impl<F, Fut, E> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, E> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<(), HandlerError>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A raw request handler: the shape middleware takes and returns.
///
/// Cloning is one `Arc` increment.
#[derive(Clone)]
pub struct Endpoint(Arc<dyn Fn(ResponseWriter, Request) -> BoxFuture<()> + Send + Sync + 'static>);

impl Endpoint {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |w: ResponseWriter, req: Request| -> BoxFuture<()> {
            Box::pin(f(w, req))
        }))
    }

    /// Runs the endpoint for one request.
    pub fn call(&self, w: ResponseWriter, req: Request) -> BoxFuture<()> {
        (self.0)(w, req)
    }

    /// Endpoint that runs a user handler and writes its error, if any.
    pub(crate) fn from_handler(handler: BoxedHandler) -> Self {
        Self::new(move |w: ResponseWriter, req| {
            let handler = Arc::clone(&handler);
            async move {
                let ctx = Context::new(w.clone(), req);
                if let Err(err) = handler.call(ctx).await {
                    write_error(&w, &err);
                }
            }
        })
    }

    /// Endpoint answering a CORS preflight: `200 OK`, empty body.
    pub(crate) fn preflight() -> Self {
        Self::new(|w: ResponseWriter, _req| async move {
            w.write_header(http::StatusCode::OK);
        })
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Endpoint")
    }
}

fn write_error(w: &ResponseWriter, err: &HandlerError) {
    let status = err.status();
    if status.is_server_error() {
        tracing::warn!(%status, error = %err, "handler failed");
    } else {
        tracing::debug!(%status, error = %err, "handler rejected request");
    }
    w.reset();
    w.write_text(status, &err.to_string());
}
