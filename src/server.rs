//! HTTP server and graceful shutdown.
//!
//! The server reacts to SIGTERM / Ctrl-C by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Telling every open connection to finish its in-flight request and close.
//! 3. Returning from [`Router::start`] once they have, which lets `main` exit.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ServerOptions;
use crate::error::Error;
use crate::response::text_response;
use crate::router::Router;

// hyper panics on HTTP/1 buffers smaller than this.
const MIN_BUF_SIZE: usize = 8192;

impl Router {
    /// Binds `addr` and serves until SIGTERM or Ctrl-C, then drains
    /// in-flight requests.
    ///
    /// Fails if `addr` is not a `host:port` socket address or cannot be
    /// bound. Callers usually treat that as fatal:
    ///
    /// ```rust,no_run
    /// # async fn run() {
    /// if let Err(e) = umi::Router::new().start("0.0.0.0:8000").await {
    ///     tracing::error!("server error: {e}");
    ///     std::process::exit(1);
    /// }
    /// # }
    /// ```
    pub async fn start(self, addr: &str) -> Result<(), Error> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves connections from an already-bound `listener` until `shutdown`
    /// resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let local_addr = listener.local_addr()?;
        if self.options.print_routes {
            self.log_routes();
        }

        let conn_builder = connection_builder(&self.server_options);
        let write_timeout = self.server_options.write_timeout;

        // Shared read-only by every connection task from here on.
        let router = Arc::new(self);
        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();

        info!(addr = %local_addr, "umi listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let svc = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        async move { dispatch(router, req, remote_addr, write_timeout).await }
                    });

                    let conn = conn_builder
                        .serve_connection(TokioIo::new(stream), svc)
                        .into_owned();
                    let conn = graceful.watch(conn);

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}

        info!("umi stopped");
        Ok(())
    }
}

/// hyper connection settings derived from [`ServerOptions`]. HTTP/1.1 and
/// HTTP/2 are both served, whichever the client speaks.
fn connection_builder(opts: &ServerOptions) -> ConnBuilder<TokioExecutor> {
    if opts.max_header_bytes < MIN_BUF_SIZE {
        warn!(
            requested = opts.max_header_bytes,
            applied = MIN_BUF_SIZE,
            "max_header_bytes is below the HTTP/1 minimum, raising it"
        );
    }

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(opts.read_timeout)
        .max_buf_size(opts.max_header_bytes.max(MIN_BUF_SIZE));
    builder
        .http2()
        .timer(TokioTimer::new())
        .max_header_list_size(u32::try_from(opts.max_header_bytes).unwrap_or(u32::MAX));
    builder
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request under the write deadline.
///
/// The error type is [`Infallible`]: every failure becomes a response
/// (404, 405, 500, 503...) so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    write_timeout: Duration,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    match tokio::time::timeout(write_timeout, router.handle(req, remote_addr)).await {
        Ok(res) => Ok(res),
        Err(_) => {
            warn!(peer = %remote_addr, ?write_timeout, "request exceeded write timeout");
            Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, "request timed out"))
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available. A signal that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
