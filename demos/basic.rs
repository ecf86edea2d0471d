//! Minimal umi example: JSON endpoints, a custom middleware and permissive CORS.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8000/
//!   curl -X POST http://localhost:8000/echo -d '{"name":"alice"}'
//!   curl -X POST http://localhost:8000/echo -d 'not json'
//!   curl -i -X OPTIONS http://localhost:8000/echo

use umi::{Context, Endpoint, HandlerError, Request, ResponseWriter, Router, StatusCode, middleware};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .with_flexible_cors()
        .get("/", index)
        // Routes registered from here on also run `printer`; `/` does not.
        .middleware(printer())
        .post("/echo", echo)
        .get("/users/{id}", get_user);

    if let Err(e) = app.start("0.0.0.0:8000").await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}

fn printer() -> umi::Middleware {
    middleware::from_fn(|w: ResponseWriter, req: Request, next: Endpoint| async move {
        tracing::info!(path = req.path(), "custom middleware");
        next.call(w, req).await;
    })
}

// GET /
async fn index(ctx: Context) -> Result<(), HandlerError> {
    ctx.json(&serde_json::json!({ "foo": "bar" }))?;
    Ok(())
}

// POST /echo: send the JSON body back, 400 if it is not JSON.
async fn echo(ctx: Context) -> Result<(), HandlerError> {
    let body: serde_json::Value = ctx
        .decode_json()
        .map_err(|e| ctx.fail(e, StatusCode::BAD_REQUEST))?;
    ctx.json(&body)?;
    Ok(())
}

// GET /users/{id}
async fn get_user(ctx: Context) -> Result<(), HandlerError> {
    match ctx.param("id") {
        Some("0") => Err(ctx.fail("user 0 does not exist", StatusCode::NOT_FOUND)),
        Some(id) => {
            ctx.json(&serde_json::json!({ "id": id, "name": "alice" }))?;
            Ok(())
        }
        None => Err("route without an id parameter".into()),
    }
}
