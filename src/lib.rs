//! # rampart
//!
//! A composable HTTP middleware pipeline for Rust services behind a reverse
//! proxy. Nothing more. Nothing less.
//!
//! ## The model
//!
//! Server behavior is built out of small, independently-testable units.
//! A [`Middleware`] wraps the next stage of processing; a [`Chain`] folds an
//! ordered list of them into a single [`Handler`]. Requests travel inward
//! stage by stage; response writes travel outward through nested
//! [`ResponseWriter`] decorators to the real writer. The first middleware
//! registered is the outermost — it sees the request first and the response
//! last.
//!
//! What's in the box:
//!
//! - **Chain composition** — ordering, conditional branches
//!   ([`Cond`]), scoped sub-pipelines ([`middleware::Block`])
//! - **Writer instrumentation** — idempotent status commit, capability
//!   forwarding, and the built-ins that rely on it: [`middleware::Timeout`],
//!   [`middleware::Logger`], header interceptors
//! - **Runtime glue** — a hyper server loop with graceful shutdown, a
//!   radix-tree [`Router`] terminal, health probes
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use http::Method;
//! use rampart::middleware::{Logger, NonWww, Timeout};
//! use rampart::{BoxFuture, Chain, HandlerFunc, Request, ResponseWriter, Router, Server};
//!
//! fn hello<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
//!     Box::pin(async move {
//!         let _ = w.write(b"hello");
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new().on(Method::GET, "/hello", HandlerFunc(hello));
//!
//!     let chain = Chain::new()
//!         .with(Logger::stdout())
//!         .with(NonWww::new())
//!         .with(Timeout::new(Duration::from_secs(10)));
//!
//!     Server::bind("0.0.0.0:3000")
//!         .serve(chain.handler(Arc::new(app)))
//!         .await
//!         .expect("server error");
//! }
//! ```

mod chain;
mod error;
mod handler;
mod request;
mod router;
mod server;

pub mod health;
pub mod middleware;
pub mod upstream;
pub mod writer;

pub use chain::{Chain, Cond, Middleware, MiddlewareFn, Predicate};
pub use error::Error;
pub use handler::{BoxFuture, Handler, HandlerFunc, SharedHandler};
pub use request::Request;
pub use router::Router;
pub use server::Server;
pub use writer::{Hijacked, NotSupported, ResponseWriter};
