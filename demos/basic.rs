//! Minimal rampart example — a logged, time-bounded pipeline in front of a
//! router, with health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/hello
//!   curl http://localhost:3000/users/42
//!   curl -H 'Host: www.localhost:3000' http://localhost:3000/hello   # 301
//!   curl http://localhost:3000/healthz

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use rampart::middleware::{InterceptResponse, Logger, NonWww, Timeout};
use rampart::{BoxFuture, Chain, HandlerFunc, Request, ResponseWriter, Router, Server, health};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .on(Method::GET, "/hello", HandlerFunc(hello))
        .on(Method::GET, "/users/{id}", HandlerFunc(get_user))
        .on(Method::GET, "/healthz", HandlerFunc(health::liveness))
        .on(Method::GET, "/readyz", HandlerFunc(health::readiness));

    let chain = Chain::new()
        .with(Logger::stdout())
        .with(NonWww::new())
        .with(Timeout::new(Duration::from_secs(10)))
        .with(InterceptResponse::new(|_status, headers| {
            headers.insert("server", "rampart".parse().unwrap());
        }));

    Server::bind("0.0.0.0:3000")
        .serve(chain.handler(Arc::new(app)))
        .await
        .expect("server error");
}

// GET /hello
fn hello<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
    Box::pin(async move {
        let _ = w.write(b"hello\n");
    })
}

// GET /users/{id}
//
// rampart sends bytes — build them however you like:
//   serde_json::to_vec(&user).unwrap()
//   format!(r#"{{"id":"{id}"}}"#).into_bytes()
fn get_user<'a>(req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
    Box::pin(async move {
        let id = req.param("id").unwrap_or("unknown").to_owned();
        w.headers_mut()
            .insert("content-type", "application/json".parse().unwrap());
        let _ = w.write(format!(r#"{{"id":"{id}","name":"alice"}}"#).as_bytes());
    })
}
