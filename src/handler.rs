//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The chain needs to hold handlers and middlewares of *different* types in
//! uniform collections, so everything is erased behind trait objects. A
//! handler's `serve` hands back a boxed future; the only runtime cost per
//! request is one `Arc` clone (atomic inc) per wrapping stage plus one
//! virtual call — negligible compared to network I/O.
//!
//! The writer is passed as `&mut dyn ResponseWriter` rather than by value so
//! a wrapping stage still owns its decorator after the inner stage returns —
//! that is what lets interceptors run deferred finalizers and lets the
//! timeout enforcer inspect the race outcome once the handler is done.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime must be able to poll the future
/// in-place; `Send` so tokio may move it across threads. The lifetime ties
/// the future to the handler and writer borrows it captures.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A unit of request processing.
///
/// A handler consumes the request and produces all of its effects through
/// the writer. There is no return value: "the response" is whatever was
/// committed and written by the time the future resolves.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a>;
}

/// A cheaply-cloneable handler shared across concurrent requests.
pub type SharedHandler = Arc<dyn Handler>;

impl Handler for Arc<dyn Handler> {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        (**self).serve(req, w)
    }
}

// ── Function adapter ──────────────────────────────────────────────────────────

/// Adapter turning a plain function into a [`Handler`].
///
/// Because the writer is a borrowed trait object, the function must return a
/// [`BoxFuture`] itself — `fn` items with an explicit lifetime do this
/// cleanly, where closure inference falls over:
///
/// ```rust
/// use rampart::{BoxFuture, HandlerFunc, Request, ResponseWriter};
///
/// fn hello<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
///     Box::pin(async move {
///         let _ = w.write(b"hello");
///     })
/// }
///
/// let handler = HandlerFunc(hello);
/// # let _ = handler;
/// ```
pub struct HandlerFunc<F>(pub F);

impl<F> Handler for HandlerFunc<F>
where
    F: for<'a> Fn(Request, &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        (self.0)(req, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Recorder;
    use http::{Method, StatusCode};

    fn teapot<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
        Box::pin(async move {
            w.write_head(StatusCode::IM_A_TEAPOT);
        })
    }

    #[tokio::test]
    async fn handler_func_delegates() {
        let h: SharedHandler = Arc::new(HandlerFunc(teapot));
        let mut w = Recorder::new();
        h.serve(Request::new(Method::GET, "/".parse().unwrap()), &mut w)
            .await;
        assert_eq!(w.status(), Some(StatusCode::IM_A_TEAPOT));
    }
}
