//! Scoped middleware block.

use std::sync::Arc;

use http::StatusCode;

use crate::chain::{Chain, Middleware, Predicate};
use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// A sub-pipeline scoped to requests selected by a matcher.
///
/// A block carries its own internal [`Chain`] and its own terminal: traffic
/// routed into the block that nothing inside claims ends at the block's
/// [`NotFound`] handler, never back in the surrounding pipeline.
///
/// The matcher is optional, and its absence changes the contract: **a block
/// without a matcher is authoritative for every request**. The surrounding
/// pipeline's next stage is discarded at composition time and can never run.
/// Supply a matcher whenever non-matching traffic should pass through:
///
/// ```rust
/// use rampart::middleware::Block;
///
/// // only /api traffic enters the block; the rest continues outward
/// let api = Block::matching(|req| req.uri().path().starts_with("/api"));
/// # let _ = api;
/// ```
pub struct Block {
    matcher: Option<Predicate>,
    chain: Chain,
}

impl Block {
    /// A block with no matcher: swallows every request (see type docs).
    pub fn new() -> Self {
        Self { matcher: None, chain: Chain::new() }
    }

    /// A block scoped to requests for which `matcher` returns true.
    pub fn matching(
        matcher: impl Fn(&Request) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            matcher: Some(Arc::new(matcher)),
            chain: Chain::new(),
        }
    }

    /// Appends to the block's internal chain.
    pub fn push(&mut self, m: impl Middleware) {
        self.chain.push(m);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, m: impl Middleware) -> Self {
        self.chain.push(m);
        self
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Block {
    fn wrap(&self, outer: SharedHandler) -> SharedHandler {
        let inner = self.chain.handler(Arc::new(NotFound));

        match &self.matcher {
            // No matcher: the internal chain replaces the pipeline outright.
            None => inner,
            Some(matcher) => Arc::new(BlockHandler {
                matcher: Arc::clone(matcher),
                inner,
                outer,
            }),
        }
    }
}

struct BlockHandler {
    matcher: Predicate,
    inner: SharedHandler,
    outer: SharedHandler,
}

impl Handler for BlockHandler {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        if (self.matcher)(&req) {
            self.inner.serve(req, w)
        } else {
            self.outer.serve(req, w)
        }
    }
}

/// Terminal that answers `404` with a plain-text body.
///
/// The default end of every [`Block`]'s internal chain; also usable as the
/// terminal of a top-level [`Chain`](crate::Chain).
pub struct NotFound;

impl Handler for NotFound {
    fn serve<'a>(
        &'a self,
        _req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            w.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            w.write_head(StatusCode::NOT_FOUND);
            let _ = w.write(b"not found");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Recorder;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count {
        hits: Arc<AtomicUsize>,
    }

    impl Middleware for Count {
        fn wrap(&self, next: SharedHandler) -> SharedHandler {
            let hits = Arc::clone(&self.hits);
            Arc::new(CountHandler { hits, next })
        }
    }

    struct CountHandler {
        hits: Arc<AtomicUsize>,
        next: SharedHandler,
    }

    impl Handler for CountHandler {
        fn serve<'a>(
            &'a self,
            req: Request,
            w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.next.serve(req, w)
        }
    }

    struct Outer {
        hits: Arc<AtomicUsize>,
    }

    impl Handler for Outer {
        fn serve<'a>(
            &'a self,
            _req: Request,
            w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let _ = w.write(b"outer");
            })
        }
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path.parse().unwrap())
    }

    #[tokio::test]
    async fn block_without_matcher_swallows_everything() {
        let outer_hits = Arc::new(AtomicUsize::new(0));
        let app = Block::new().wrap(Arc::new(Outer { hits: Arc::clone(&outer_hits) }));

        let mut w = Recorder::new();
        app.serve(get("/anything"), &mut w).await;

        assert_eq!(w.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(w.body_str(), "not found");
        assert_eq!(outer_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn matched_traffic_stays_inside_the_block() {
        let inner_hits = Arc::new(AtomicUsize::new(0));
        let outer_hits = Arc::new(AtomicUsize::new(0));

        let block = Block::matching(|req| req.uri().path() == "/api")
            .with(Count { hits: Arc::clone(&inner_hits) });
        let app = block.wrap(Arc::new(Outer { hits: Arc::clone(&outer_hits) }));

        let mut w = Recorder::new();
        app.serve(get("/api"), &mut w).await;
        assert_eq!(inner_hits.load(Ordering::SeqCst), 1);
        assert_eq!(outer_hits.load(Ordering::SeqCst), 0);
        // nothing inside claimed it, so the block's own terminal answered
        assert_eq!(w.status(), Some(StatusCode::NOT_FOUND));

        let mut w = Recorder::new();
        app.serve(get("/x"), &mut w).await;
        assert_eq!(inner_hits.load(Ordering::SeqCst), 1);
        assert_eq!(outer_hits.load(Ordering::SeqCst), 1);
        assert_eq!(w.body_str(), "outer");
    }
}
