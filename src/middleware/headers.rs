//! Header interception at well-defined points.
//!
//! [`InterceptRequest`] sees inbound headers before dispatch.
//! [`InterceptResponse`] sees the response head at the last possible moment:
//! its callback runs exactly once per request, at the handler's first status
//! commit — or, if the handler never commits, when the request completes.
//! Either way the callback gets mutable access to the not-yet-committed
//! status and header map, so it can inject or rewrite headers regardless of
//! what the wrapped handler already decided.

use std::io;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};

use crate::chain::Middleware;
use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::{Hijacked, NotSupported, ResponseWriter};

// ── Request side ──────────────────────────────────────────────────────────────

type RequestCallback = Arc<dyn Fn(&mut HeaderMap) + Send + Sync>;

/// Runs a callback over the inbound header map before dispatch.
///
/// A default-constructed interceptor has no callback and composes to the
/// identity — no wrapping, no per-request cost.
#[derive(Default)]
pub struct InterceptRequest {
    callback: Option<RequestCallback>,
}

impl InterceptRequest {
    pub fn new(callback: impl Fn(&mut HeaderMap) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }
}

impl Middleware for InterceptRequest {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        match &self.callback {
            None => next,
            Some(callback) => Arc::new(InterceptRequestHandler {
                callback: Arc::clone(callback),
                next,
            }),
        }
    }
}

struct InterceptRequestHandler {
    callback: RequestCallback,
    next: SharedHandler,
}

impl Handler for InterceptRequestHandler {
    fn serve<'a>(
        &'a self,
        mut req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        (self.callback)(req.headers_mut());
        self.next.serve(req, w)
    }
}

// ── Response side ─────────────────────────────────────────────────────────────

type ResponseCallback = Arc<dyn Fn(&mut StatusCode, &mut HeaderMap) + Send + Sync>;

/// Runs a callback over the response head, exactly once per request.
///
/// ```rust
/// use rampart::Chain;
/// use rampart::middleware::InterceptResponse;
///
/// let chain = Chain::new().with(InterceptResponse::new(|_status, headers| {
///     headers.insert("server", "rampart".parse().unwrap());
/// }));
/// # let _ = chain;
/// ```
#[derive(Default)]
pub struct InterceptResponse {
    callback: Option<ResponseCallback>,
}

impl InterceptResponse {
    pub fn new(
        callback: impl Fn(&mut StatusCode, &mut HeaderMap) + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }
}

impl Middleware for InterceptResponse {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        match &self.callback {
            None => next,
            Some(callback) => Arc::new(InterceptResponseHandler {
                callback: Arc::clone(callback),
                next,
            }),
        }
    }
}

struct InterceptResponseHandler {
    callback: ResponseCallback,
    next: SharedHandler,
}

impl Handler for InterceptResponseHandler {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut iw = InterceptWriter {
                inner: w,
                callback: Arc::clone(&self.callback),
                status: StatusCode::OK,
                fired: false,
                committed: false,
            };
            self.next.serve(req, &mut iw).await;
            // Deferred finalizer: a handler that never committed still gets
            // its head intercepted; header mutations land in the buffer the
            // real writer will commit from.
            iw.finalize();
        })
    }
}

struct InterceptWriter<'w> {
    inner: &'w mut (dyn ResponseWriter + 'w),
    callback: ResponseCallback,
    status: StatusCode,
    fired: bool,
    committed: bool,
}

impl InterceptWriter<'_> {
    fn finalize(&mut self) {
        if self.fired {
            return;
        }
        self.fired = true;
        (self.callback)(&mut self.status, self.inner.headers_mut());
    }
}

impl ResponseWriter for InterceptWriter<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        if !self.fired {
            self.fired = true;
            self.status = status;
            (self.callback)(&mut self.status, self.inner.headers_mut());
        }
        if self.committed {
            return;
        }
        self.committed = true;
        // the callback may have rewritten the status; its word is final
        self.inner.write_head(self.status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.committed {
            self.write_head(StatusCode::OK);
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) {
        self.inner.flush();
    }

    fn hijack(&mut self) -> Result<Hijacked, NotSupported> {
        self.inner.hijack()
    }

    fn push(&mut self, target: &str) -> Result<(), NotSupported> {
        self.inner.push(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Recorder;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn req() -> Request {
        Request::new(Method::GET, "/".parse().unwrap())
    }

    struct Commits;

    impl Handler for Commits {
        fn serve<'a>(
            &'a self,
            _req: Request,
            w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            Box::pin(async move {
                w.write_head(StatusCode::CREATED);
                let _ = w.write(b"made");
            })
        }
    }

    struct WritesOnly;

    impl Handler for WritesOnly {
        fn serve<'a>(
            &'a self,
            _req: Request,
            w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            Box::pin(async move {
                let _ = w.write(b"implicit");
            })
        }
    }

    struct Silent;

    impl Handler for Silent {
        fn serve<'a>(
            &'a self,
            _req: Request,
            _w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            Box::pin(async {})
        }
    }

    async fn count_firings(inner: SharedHandler) -> usize {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let app = InterceptResponse::new(move |_status, _headers| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wrap(inner);

        let mut w = Recorder::new();
        app.serve(req(), &mut w).await;
        fired.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn callback_fires_exactly_once_per_request() {
        assert_eq!(count_firings(Arc::new(Commits)).await, 1);
        assert_eq!(count_firings(Arc::new(WritesOnly)).await, 1);
        assert_eq!(count_firings(Arc::new(Silent)).await, 1);
    }

    #[tokio::test]
    async fn callback_rewrites_the_head_before_commit() {
        let app = InterceptResponse::new(|status, headers| {
            *status = StatusCode::IM_A_TEAPOT;
            headers.insert("x-injected", "yes".parse().unwrap());
        })
        .wrap(Arc::new(Commits));

        let mut w = Recorder::new();
        app.serve(req(), &mut w).await;

        assert_eq!(w.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(
            w.committed_headers().unwrap().get("x-injected").unwrap(),
            "yes"
        );
        assert_eq!(w.body_str(), "made");
    }

    #[tokio::test]
    async fn request_interceptor_mutates_inbound_headers() {
        struct Echo;

        impl Handler for Echo {
            fn serve<'a>(
                &'a self,
                req: Request,
                w: &'a mut (dyn ResponseWriter + 'a),
            ) -> BoxFuture<'a> {
                Box::pin(async move {
                    let tag = req.header("x-tag").unwrap_or("absent").to_owned();
                    let _ = w.write(tag.as_bytes());
                })
            }
        }

        let app = InterceptRequest::new(|headers| {
            headers.insert("x-tag", "stamped".parse().unwrap());
        })
        .wrap(Arc::new(Echo));

        let mut w = Recorder::new();
        app.serve(req(), &mut w).await;
        assert_eq!(w.body_str(), "stamped");
    }

    #[test]
    fn unconfigured_interceptors_compose_to_identity() {
        let next: SharedHandler = Arc::new(Silent);
        let wrapped = InterceptRequest::default().wrap(Arc::clone(&next));
        assert!(Arc::ptr_eq(&wrapped, &next));
        let wrapped = InterceptResponse::default().wrap(Arc::clone(&next));
        assert!(Arc::ptr_eq(&wrapped, &next));
    }
}
