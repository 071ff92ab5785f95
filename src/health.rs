//! Built-in Kubernetes health-check terminals.
//!
//! Kubernetes asks two questions; these handlers answer them.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Register them on your router:
//!
//! ```rust
//! use http::Method;
//! use rampart::{HandlerFunc, Router, health};
//!
//! let app = Router::new()
//!     .on(Method::GET, "/healthz", HandlerFunc(health::liveness))
//!     .on(Method::GET, "/readyz", HandlerFunc(health::readiness));
//! # let _ = app;
//! ```
//!
//! Replace `readiness` with your own handler if the pod must gate on
//! dependency availability (database connections, downstream services).

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Kubernetes liveness probe handler.
///
/// Always `200 OK` with body `"ok"`. If the process can respond to HTTP at
/// all, it is alive — this handler intentionally has no dependencies.
pub fn liveness<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
    Box::pin(async move {
        let _ = w.write(b"ok");
    })
}

/// Kubernetes readiness probe handler (default implementation).
pub fn readiness<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
    Box::pin(async move {
        let _ = w.write(b"ready");
    })
}
