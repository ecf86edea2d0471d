//! Route table, middleware registration and in-process dispatch.
//!
//! One radix tree over paths, one small method map per path. Every
//! registration freezes an endpoint: the middleware registered *so far*,
//! wrapped around the handler. Middleware added afterwards does not reach
//! routes that already exist, so register middleware first.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use matchit::Router as MatchitRouter;
use tracing::{debug, info, warn};

use crate::config::{Options, ServerOptions};
use crate::error::{BoxError, Error};
use crate::handler::{Endpoint, Handler};
use crate::method::Method;
use crate::middleware::{self, Cors, Middleware, chain};
use crate::request::Request;
use crate::response::{ResponseWriter, text_response};

/// A registered (method, path) pair. The handler itself lives in the
/// frozen endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: String,
}

impl Route {
    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
}

/// Endpoints registered for one path pattern.
#[derive(Default)]
struct Slot {
    endpoints: HashMap<Method, Endpoint>,
    // Implicit OPTIONS responder, used when no OPTIONS handler is registered.
    preflight: Option<Endpoint>,
}

impl Slot {
    fn allow(&self) -> HeaderValue {
        let allowed: Vec<&str> = Method::ALL
            .into_iter()
            .filter(|m| match m {
                Method::Head => self.endpoints.contains_key(&Method::Head)
                    || self.endpoints.contains_key(&Method::Get),
                Method::Options => self.endpoints.contains_key(&Method::Options)
                    || self.preflight.is_some(),
                m => self.endpoints.contains_key(m),
            })
            .map(Method::as_str)
            .collect();
        // Method names are plain ASCII tokens.
        HeaderValue::from_str(&allowed.join(", ")).unwrap_or(HeaderValue::from_static(""))
    }
}

enum Lookup {
    Found { method: Method, endpoint: Endpoint, params: HashMap<String, String> },
    MethodNotAllowed { allow: HeaderValue },
    NotFound,
}

/// The application router.
///
/// Build it once at startup, then hand it to [`Router::start`]. Every
/// builder method takes and returns `self` so registrations chain:
///
/// ```rust,no_run
/// use umi::{Context, HandlerError, Router};
///
/// # async fn get_user(_: Context) -> Result<(), HandlerError> { Ok(()) }
/// # async fn create_user(_: Context) -> Result<(), HandlerError> { Ok(()) }
/// # async fn run() -> Result<(), umi::Error> {
/// Router::new()
///     .with_flexible_cors()
///     .get("/users/{id}", get_user)
///     .post("/users", create_user)
///     .start("0.0.0.0:8000")
///     .await
/// # }
/// ```
pub struct Router {
    tree: MatchitRouter<usize>,
    patterns: HashMap<String, usize>,
    slots: Vec<Slot>,
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
    pub(crate) options: Options,
    pub(crate) server_options: ServerOptions,
}

impl Router {
    /// A router with [`Options::default`]: request logging on, CORS off.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// A router honouring `options`. The logger and flexible CORS middleware
    /// are installed here when the options ask for them.
    pub fn with_options(options: Options) -> Self {
        let mut router = Self {
            tree: MatchitRouter::new(),
            patterns: HashMap::new(),
            slots: Vec::new(),
            routes: Vec::new(),
            middleware: Vec::new(),
            options,
            server_options: ServerOptions::default(),
        };
        if router.options.log_requests {
            router.middleware.push(middleware::logger());
        }
        if router.options.cors {
            router.middleware.push(middleware::flexible_cors());
        }
        router
    }

    /// Overrides the transport tuning applied by [`Router::start`].
    pub fn with_server_options(mut self, options: ServerOptions) -> Self {
        self.server_options = options;
        self
    }

    /// Appends a middleware. It applies to routes registered after this call.
    pub fn middleware(mut self, m: Middleware) -> Self {
        self.middleware.push(m);
        self
    }

    /// Appends the strict CORS middleware built from `rules`.
    pub fn with_cors(self, rules: Cors) -> Result<Self, Error> {
        Ok(self.middleware(middleware::cors(&rules)?))
    }

    /// Appends the permissive CORS preset.
    pub fn with_flexible_cors(self) -> Self {
        self.middleware(middleware::flexible_cors())
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `ctx.param("name")` retrieves
    /// them. Registering the same pair twice replaces the first handler.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern or conflicts with an
    /// existing one (e.g. `/{id}` next to `/{name}`).
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler)
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Patch, path, handler)
    }

    /// `HEAD` requests to a path with only a `GET` route are served by the
    /// `GET` handler with the body dropped; register this to override.
    pub fn head(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Head, path, handler)
    }

    /// An explicit `OPTIONS` handler replaces the built-in preflight
    /// responder for this path.
    pub fn options(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Options, path, handler)
    }

    pub fn trace(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Trace, path, handler)
    }

    pub fn connect(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::Connect, path, handler)
    }

    /// Every registration so far, in order, duplicates included.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn add(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let layers = chain(&self.middleware);
        let slot = self.slot_for(path);
        let slot = &mut self.slots[slot];

        let endpoint = layers.wrap(Endpoint::from_handler(handler.into_boxed_handler()));
        if slot.endpoints.insert(method, endpoint).is_some() {
            warn!(%method, path, "route registered twice, last registration wins");
        }
        if method.answers_preflight() {
            slot.preflight = Some(layers.wrap(Endpoint::preflight()));
        }

        self.routes.push(Route { method, path: path.to_owned() });
        self
    }

    fn slot_for(&mut self, path: &str) -> usize {
        if let Some(&slot) = self.patterns.get(path) {
            return slot;
        }
        let slot = self.slots.len();
        self.tree
            .insert(path, slot)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self.slots.push(Slot::default());
        self.patterns.insert(path.to_owned(), slot);
        slot
    }

    // `method` is `None` for methods outside RFC 9110, which no route can
    // answer.
    fn lookup(&self, method: Option<Method>, path: &str) -> Lookup {
        let Ok(matched) = self.tree.at(path) else {
            return Lookup::NotFound;
        };
        let slot = &self.slots[*matched.value];
        let Some(method) = method else {
            return Lookup::MethodNotAllowed { allow: slot.allow() };
        };

        let endpoint = match method {
            Method::Options => slot.endpoints.get(&Method::Options).or(slot.preflight.as_ref()),
            Method::Head => slot
                .endpoints
                .get(&Method::Head)
                .or_else(|| slot.endpoints.get(&Method::Get)),
            m => slot.endpoints.get(&m),
        };

        match endpoint {
            Some(endpoint) => Lookup::Found {
                method,
                endpoint: endpoint.clone(),
                params: matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect(),
            },
            None => Lookup::MethodNotAllowed { allow: slot.allow() },
        }
    }

    pub(crate) fn log_routes(&self) {
        info!(count = self.routes.len(), "registered routes");
        for route in &self.routes {
            info!(method = %route.method, path = %route.path, "route");
        }
    }

    /// Routes one request and produces its response, without a network
    /// round trip. This is what the server calls for every request.
    ///
    /// - unknown path: `404`
    /// - known path, unregistered or unknown method: `405` with an `Allow`
    ///   header
    /// - request body that cannot be read: `400`
    pub async fn handle<B>(
        &self,
        req: http::Request<B>,
        remote_addr: SocketAddr,
    ) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let method = Method::try_from(req.method()).ok();

        let (method, endpoint, params) = match self.lookup(method, req.uri().path()) {
            Lookup::Found { method, endpoint, params } => (method, endpoint, params),
            Lookup::NotFound => return text_response(StatusCode::NOT_FOUND, "404 page not found"),
            Lookup::MethodNotAllowed { allow } => {
                let mut res = text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
                res.headers_mut().insert(ALLOW, allow);
                return res;
            }
        };

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let e: BoxError = e.into();
                debug!(peer = %remote_addr, error = %e, "failed to read request body");
                return text_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        let writer = ResponseWriter::new();
        endpoint
            .call(writer.clone(), Request::new(parts, method, body, params, remote_addr))
            .await;

        let mut res = writer.take_response();
        if method == Method::Head {
            *res.body_mut() = Full::default();
        }
        res
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
