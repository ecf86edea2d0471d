//! Router and server configuration.

use std::time::Duration;

/// Behaviour flags, fixed when the router is built.
///
/// ```rust
/// use umi::{Options, Router};
///
/// let app = Router::with_options(Options { log_requests: false, ..Options::default() });
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Log the route table when the server starts.
    pub print_routes: bool,
    /// Install the [`logger`](crate::middleware::logger) middleware.
    pub log_requests: bool,
    /// Install the [`flexible_cors`](crate::middleware::flexible_cors) middleware.
    pub cors: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { print_routes: true, log_requests: true, cors: false }
    }
}

/// Transport tuning handed to hyper when the server starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerOptions {
    /// Time allowed for a client to send the request head.
    pub read_timeout: Duration,
    /// Time allowed from the end of the request head until the response is
    /// ready. Requests exceeding it are answered `503 Service Unavailable`.
    pub write_timeout: Duration,
    /// Upper bound on the size of the request head.
    pub max_header_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            max_header_bytes: 1 << 20,
        }
    }
}
