//! Request logging.

use std::time::Instant;

use http::StatusCode;
use tracing::info;

use super::{Middleware, from_fn};
use crate::handler::Endpoint;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Logs every request on arrival (remote address, method, path) and again on
/// completion with the status and latency. Event timestamps come from the
/// installed `tracing` subscriber.
///
/// Purely observational: always calls the next endpoint.
pub fn logger() -> Middleware {
    from_fn(|w: ResponseWriter, req: Request, next: Endpoint| async move {
        let started = Instant::now();
        let remote = req.remote_addr();
        let method = req.method();
        let path = req.path().to_owned();

        info!(%remote, %method, %path, "request received");

        next.call(w.clone(), req).await;

        let status = w.status().unwrap_or(StatusCode::OK);
        info!(
            %remote,
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
    })
}
