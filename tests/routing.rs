//! Dispatch behaviour, driven in-process through `Router::handle`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{self, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE,
};
use http::HeaderMap;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame};
use umi::{
    Context, Cors, Endpoint, HandlerError, Method, Middleware, Options, Request, ResponseWriter,
    Router, StatusCode, middleware,
};

fn quiet() -> Router {
    Router::with_options(Options { print_routes: false, log_requests: false, cors: false })
}

fn remote() -> SocketAddr {
    "127.0.0.1:5000".parse().unwrap()
}

async fn send_request(
    router: &Router,
    req: http::Request<Full<Bytes>>,
) -> (StatusCode, HeaderMap, Bytes) {
    let res = router.handle(req, remote()).await;
    let status = res.status();
    let headers = res.headers().clone();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap();
    send_request(router, req).await
}

/// Handler that answers with `name` and counts its calls.
fn named(name: &'static str, hits: &Arc<AtomicUsize>) -> impl umi::Handler {
    let hits = Arc::clone(hits);
    move |ctx: Context| {
        hits.fetch_add(1, Ordering::SeqCst);
        async move {
            ctx.text(name);
            Ok::<_, HandlerError>(())
        }
    }
}

type Log = Arc<Mutex<Vec<String>>>;

fn recording(name: &'static str, log: &Log) -> Middleware {
    let log = Arc::clone(log);
    middleware::from_fn(move |w: ResponseWriter, req: Request, next: Endpoint| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(format!("{name} pre"));
            next.call(w, req).await;
            log.lock().unwrap().push(format!("{name} post"));
        }
    })
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_reaches_exactly_the_matching_handler() {
    let get_a = Arc::new(AtomicUsize::new(0));
    let post_a = Arc::new(AtomicUsize::new(0));
    let get_b = Arc::new(AtomicUsize::new(0));

    let app = quiet()
        .get("/a", named("get a", &get_a))
        .post("/a", named("post a", &post_a))
        .get("/b", named("get b", &get_b));

    let (status, _, body) = send(&app, "POST", "/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "post a");

    let (_, _, body) = send(&app, "GET", "/b").await;
    assert_eq!(body, "get b");

    assert_eq!(get_a.load(Ordering::SeqCst), 0);
    assert_eq!(post_a.load(Ordering::SeqCst), 1);
    assert_eq!(get_b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn path_parameters_reach_the_handler() {
    let app = quiet().get("/users/{id}/posts/{post}", |ctx: Context| async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        let post = ctx.param("post").unwrap_or_default().to_owned();
        ctx.text(format!("{id}:{post}"));
        Ok::<_, HandlerError>(())
    });

    let (_, _, body) = send(&app, "GET", "/users/42/posts/7?draft=true").await;
    assert_eq!(body, "42:7");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let app = quiet().get("/a", |_ctx: Context| async { Ok::<_, HandlerError>(()) });
    let (status, _, _) = send(&app, "GET", "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_method_is_not_allowed_with_allow_header() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = quiet().get("/a", named("a", &hits)).post("/a", named("a", &hits));

    let (status, headers, _) = send(&app, "PUT", "/a").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(ALLOW).unwrap(), "GET, HEAD, POST, OPTIONS");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn extension_methods_are_not_allowed() {
    let app = quiet().get("/a", |_ctx: Context| async { Ok::<_, HandlerError>(()) });

    let (status, headers, _) = send(&app, "PURGE", "/a").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(ALLOW).unwrap(), "GET, HEAD, OPTIONS");

    let (status, _, _) = send(&app, "PURGE", "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn head_falls_back_to_get_without_body() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = quiet().get("/a", named("payload", &hits));

    let (status, headers, body) = send(&app, "HEAD", "/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
    assert!(body.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_registration_last_wins() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let app = quiet()
        .get("/a", named("first", &first))
        .get("/a", named("second", &second));

    let (_, _, body) = send(&app, "GET", "/a").await;
    assert_eq!(body, "second");
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(app.routes().len(), 2);
}

#[tokio::test]
async fn routes_are_listed_in_registration_order() {
    let app = quiet()
        .get("/a", |_ctx: Context| async { Ok::<_, HandlerError>(()) })
        .on(Method::Trace, "/b", |_ctx: Context| async { Ok::<_, HandlerError>(()) });

    let listed: Vec<(Method, &str)> = app.routes().iter().map(|r| (r.method(), r.path())).collect();
    assert_eq!(listed, [(Method::Get, "/a"), (Method::Trace, "/b")]);
}

// ── Preflight ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cors_preflight_answers_without_calling_the_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let rules = Cors {
        origin: "https://app.example".into(),
        methods: "GET, POST".into(),
        allow_headers: "Content-Type, Authorization".into(),
        allow_credentials: "true".into(),
    };
    let app = quiet().with_cors(rules).unwrap().post("/items", named("items", &hits));

    let (status, headers, body) = send(&app, "OPTIONS", "/items").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "https://app.example");
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(), "GET, POST");
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(), "Content-Type, Authorization");
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cors_headers_are_set_on_regular_requests() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = quiet().with_flexible_cors().get("/a", named("a", &hits));

    let (status, headers, body) = send(&app, "GET", "/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "a");
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cors_option_installs_the_flexible_preset() {
    let app = Router::with_options(Options { print_routes: false, log_requests: false, cors: true })
        .get("/a", |_ctx: Context| async { Ok::<_, HandlerError>(()) });

    let (_, headers, _) = send(&app, "OPTIONS", "/a").await;
    assert_eq!(
        headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        middleware::FLEXIBLE_ALLOW_METHODS,
    );
}

#[tokio::test]
async fn preflight_without_cors_is_empty_ok() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = quiet().get("/a", named("a", &hits));

    let (status, headers, body) = send(&app, "OPTIONS", "/a").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn explicit_options_handler_overrides_preflight() {
    let preflight = Arc::new(AtomicUsize::new(0));
    let get = Arc::new(AtomicUsize::new(0));
    let app = quiet()
        .options("/a", named("custom options", &preflight))
        .get("/a", named("a", &get));

    let (status, _, body) = send(&app, "OPTIONS", "/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "custom options");
    assert_eq!(preflight.load(Ordering::SeqCst), 1);
    assert_eq!(get.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn trace_does_not_install_a_preflight() {
    let app = quiet().trace("/t", |_ctx: Context| async { Ok::<_, HandlerError>(()) });
    let (status, headers, _) = send(&app, "OPTIONS", "/t").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(ALLOW).unwrap(), "TRACE");
}

// ── Middleware ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn middleware_runs_in_registration_order() {
    let log = Log::default();
    let handler_log = Arc::clone(&log);
    let app = quiet()
        .middleware(recording("m1", &log))
        .middleware(recording("m2", &log))
        .get("/a", move |_ctx: Context| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().unwrap().push("handler".to_owned());
                Ok::<_, HandlerError>(())
            }
        });

    send(&app, "GET", "/a").await;

    assert_eq!(
        *log.lock().unwrap(),
        ["m1 pre", "m2 pre", "handler", "m2 post", "m1 post"],
    );
}

#[tokio::test]
async fn middleware_added_after_a_route_does_not_apply_to_it() {
    let log = Log::default();
    let app = quiet()
        .middleware(recording("early", &log))
        .get("/before", |_ctx: Context| async { Ok::<_, HandlerError>(()) })
        .middleware(recording("late", &log))
        .get("/after", |_ctx: Context| async { Ok::<_, HandlerError>(()) });

    send(&app, "GET", "/before").await;
    assert_eq!(*log.lock().unwrap(), ["early pre", "early post"]);

    log.lock().unwrap().clear();
    send(&app, "GET", "/after").await;
    assert_eq!(
        *log.lock().unwrap(),
        ["early pre", "late pre", "late post", "early post"],
    );
}

// ── Error translation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn typed_error_sets_status_and_body() {
    let app = quiet().get("/teapot", |ctx: Context| async move {
        Err::<(), _>(ctx.fail("boom", StatusCode::IM_A_TEAPOT))
    });

    let (status, headers, body) = send(&app, "GET", "/teapot").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, "boom");
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
}

#[tokio::test]
async fn typed_error_replaces_a_partially_written_response() {
    let app = quiet()
        .with_flexible_cors()
        .get("/half", |ctx: Context| async move {
            ctx.json(&serde_json::json!({ "a": 1 }))?;
            Err::<(), _>(ctx.fail("boom", StatusCode::IM_A_TEAPOT))
        });

    let (status, headers, body) = send(&app, "GET", "/half").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
    assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert_eq!(body, "boom");
}

#[tokio::test]
async fn plain_error_is_internal_server_error() {
    let app = quiet().get("/oops", |_ctx: Context| async {
        Err::<(), _>(HandlerError::from("oops"))
    });

    let (status, _, body) = send(&app, "GET", "/oops").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(std::str::from_utf8(&body).unwrap().contains("oops"));
}

#[tokio::test]
async fn io_errors_propagate_with_question_mark() {
    fn load() -> std::io::Result<()> {
        Err(std::io::Error::other("config missing"))
    }

    async fn read_config(_ctx: Context) -> Result<(), HandlerError> {
        load()?;
        Ok(())
    }
    let app = quiet().get("/config", read_config);

    let (status, _, body) = send(&app, "GET", "/config").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "config missing");
}

// ── JSON ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_round_trips() {
    let app = quiet().get("/", |ctx: Context| async move {
        ctx.json(&HashMap::from([("foo", "bar")]))?;
        Ok::<_, HandlerError>(())
    });

    let (status, headers, body) = send(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

    let decoded: HashMap<String, String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(decoded, HashMap::from([("foo".to_owned(), "bar".to_owned())]));
}

#[tokio::test]
async fn json_failure_writes_nothing_and_becomes_a_typed_error() {
    let app = quiet().get("/", |ctx: Context| async move {
        // JSON object keys must be strings.
        let unencodable = HashMap::from([((1, 2), "tuple key")]);
        ctx.json(&unencodable)
            .map_err(|e| ctx.fail(e, StatusCode::INTERNAL_SERVER_ERROR))?;
        Ok::<_, HandlerError>(())
    });

    let (status, headers, body) = send(&app, "GET", "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
    assert!(std::str::from_utf8(&body).unwrap().starts_with("serialization:"));
}

#[tokio::test]
async fn decode_json_reads_the_request_body() {
    #[derive(serde::Deserialize, serde::Serialize)]
    struct User {
        name: String,
    }

    let app = quiet().post("/echo", |ctx: Context| async move {
        let user: User = ctx
            .decode_json()
            .map_err(|e| ctx.fail(e, StatusCode::BAD_REQUEST))?;
        ctx.json(&user)?;
        Ok::<_, HandlerError>(())
    });

    let req = http::Request::post("/echo")
        .body(Full::new(Bytes::from_static(br#"{"name":"alice"}"#)))
        .unwrap();
    let (status, _, body) = send_request(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"name":"alice"}"#);

    let req = http::Request::post("/echo")
        .body(Full::new(Bytes::from_static(b"not json")))
        .unwrap();
    let (status, _, _) = send_request(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// A request body whose peer goes away before sending anything.
struct BrokenBody;

impl Body for BrokenBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        Poll::Ready(Some(Err(std::io::Error::other("connection reset"))))
    }
}

#[tokio::test]
async fn unreadable_body_is_bad_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = quiet().post("/upload", named("upload", &hits));

    let req = http::Request::post("/upload").body(BrokenBody).unwrap();
    let res = app.handle(req, remote()).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_context() {
    let app = Arc::new(quiet().get("/whoami", |ctx: Context| async move {
        let id = ctx.header("x-request-id").unwrap_or_default().to_owned();
        // Interleave with the other in-flight requests before answering.
        let delay = id.parse::<u64>().unwrap_or(0) % 7;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        ctx.text(&id);
        Ok::<_, HandlerError>(())
    }));

    let mut tasks = tokio::task::JoinSet::new();
    for id in 0..64u32 {
        let app = Arc::clone(&app);
        tasks.spawn(async move {
            let req = http::Request::get("/whoami")
                .header("x-request-id", id.to_string())
                .body(Full::new(Bytes::new()))
                .unwrap();
            let res = app.handle(req, remote()).await;
            let body = res.into_body().collect().await.unwrap().to_bytes();
            (id, body)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (id, body) = joined.unwrap();
        assert_eq!(body, id.to_string());
    }
}
