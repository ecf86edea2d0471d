//! # umi
//!
//! A small routing and middleware layer on top of hyper.
//!
//! hyper owns the protocol: parsing, HTTP/1.1 and HTTP/2, connections,
//! timeouts. umi adds the part that changes between applications:
//!
//! - Routing per method + path, via a [`matchit`] radix tree
//! - Middleware chains, first registered runs outermost
//! - Handlers that return an error instead of writing a failure response
//! - Strict and permissive CORS presets
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use umi::{Context, HandlerError, Router, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .with_flexible_cors()
//!         .get("/users/{id}", get_user)
//!         .post("/users", create_user);
//!
//!     if let Err(e) = app.start("0.0.0.0:8000").await {
//!         eprintln!("{e}");
//!         std::process::exit(1);
//!     }
//! }
//!
//! async fn get_user(ctx: Context) -> Result<(), HandlerError> {
//!     let id = ctx.param("id").unwrap_or("unknown");
//!     ctx.json(&serde_json::json!({ "id": id }))?;
//!     Ok(())
//! }
//!
//! async fn create_user(ctx: Context) -> Result<(), HandlerError> {
//!     let user: serde_json::Value = ctx
//!         .decode_json()
//!         .map_err(|e| ctx.fail(e, StatusCode::BAD_REQUEST))?;
//!     ctx.status(StatusCode::CREATED);
//!     ctx.json(&user)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Middleware scope
//!
//! A route captures the middleware registered *before* it. Middleware added
//! later only applies to routes registered after it:
//!
//! ```rust
//! use umi::{Context, HandlerError, Router, middleware};
//!
//! # async fn public(_: Context) -> Result<(), HandlerError> { Ok(()) }
//! # async fn private(_: Context) -> Result<(), HandlerError> { Ok(()) }
//! # let auth = middleware::logger();
//! let app = Router::new()
//!     .get("/public", public)     // no auth
//!     .middleware(auth)
//!     .get("/private", private);  // auth
//! ```

mod config;
mod context;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use config::{Options, ServerOptions};
pub use context::Context;
pub use error::{BoxError, Error, HandlerError};
pub use handler::{Endpoint, Handler};
pub use http::StatusCode;
pub use method::Method;
pub use middleware::{Cors, Middleware};
pub use request::Request;
pub use response::{ContentType, ResponseWriter};
pub use router::{Route, Router};
