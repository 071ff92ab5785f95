//! Middleware contract and chain composition.
//!
//! A [`Middleware`] is a transformer from handler to handler: given the next
//! stage, it produces a stage that wraps it. A [`Chain`] is an ordered list
//! of middlewares folded into a single handler — the first middleware
//! registered ends up outermost, so it runs first on the request path and
//! its writer decoration sits last on the response path.
//!
//! Chains are assembled once at startup and are immutable while serving.
//! Composing the same chain twice yields two independent handler graphs with
//! identical ordering; composition never mutates the chain itself.

use std::sync::Arc;

use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::ResponseWriter;

// ── Middleware ────────────────────────────────────────────────────────────────

/// A transformer from handler to handler.
pub trait Middleware: Send + Sync + 'static {
    /// Wraps `next`, returning the composed stage.
    fn wrap(&self, next: SharedHandler) -> SharedHandler;
}

/// A disabled middleware slot: `None` composes to the identity.
///
/// This is how optional pipeline pieces are expressed —
/// `chain.push(config.timeout.map(Timeout::new))` needs no branching at the
/// call site.
impl<M: Middleware> Middleware for Option<M> {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        match self {
            Some(m) => m.wrap(next),
            None => next,
        }
    }
}

/// Adapter turning a plain `Fn(SharedHandler) -> SharedHandler` into a
/// [`Middleware`].
pub struct MiddlewareFn<F>(pub F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(SharedHandler) -> SharedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        (self.0)(next)
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered middleware list.
///
/// ```rust
/// use rampart::{Chain, HandlerFunc, Request, ResponseWriter, BoxFuture};
/// use rampart::middleware::Logger;
/// use std::sync::Arc;
///
/// fn root<'a>(_req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
///     Box::pin(async move {
///         let _ = w.write(b"ok");
///     })
/// }
///
/// let chain = Chain::new().with(Logger::stdout());
/// let app = chain.handler(Arc::new(HandlerFunc(root)));
/// # let _ = app;
/// ```
#[derive(Default)]
pub struct Chain {
    stack: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware. Registration order is execution order.
    pub fn push(&mut self, m: impl Middleware) {
        self.stack.push(Arc::new(m));
    }

    /// Builder-style [`push`](Self::push); returns `self` so registrations
    /// chain naturally.
    pub fn with(mut self, m: impl Middleware) -> Self {
        self.push(m);
        self
    }

    /// Folds the chain around `terminal`, innermost-last: the list is walked
    /// in reverse so that the first-registered middleware wraps everything
    /// that follows it.
    pub fn handler(&self, terminal: SharedHandler) -> SharedHandler {
        self.stack
            .iter()
            .rev()
            .fold(terminal, |next, m| m.wrap(next))
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }
}

/// A chain is itself a middleware, so sub-chains compose into larger ones.
impl Middleware for Chain {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        self.handler(next)
    }
}

// ── Conditional branch ────────────────────────────────────────────────────────

/// A predicate over the incoming request.
pub type Predicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Per-request branch between two pre-built sub-pipelines.
///
/// Both branches are wrapped around the same next stage at composition time;
/// at request time the predicate is evaluated once and exactly one branch
/// handles the request. An absent `otherwise` branch is the identity.
pub struct Cond {
    predicate: Predicate,
    then: Arc<dyn Middleware>,
    otherwise: Option<Arc<dyn Middleware>>,
}

impl Cond {
    pub fn new(
        predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
        then: impl Middleware,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            then: Arc::new(then),
            otherwise: None,
        }
    }

    /// Sets the branch taken when the predicate is false.
    pub fn otherwise(mut self, m: impl Middleware) -> Self {
        self.otherwise = Some(Arc::new(m));
        self
    }
}

impl Middleware for Cond {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        let then = self.then.wrap(Arc::clone(&next));
        let otherwise = match &self.otherwise {
            Some(m) => m.wrap(next),
            None => next,
        };
        Arc::new(CondHandler {
            predicate: Arc::clone(&self.predicate),
            then,
            otherwise,
        })
    }
}

struct CondHandler {
    predicate: Predicate,
    then: SharedHandler,
    otherwise: SharedHandler,
}

impl Handler for CondHandler {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        if (self.predicate)(&req) {
            self.then.serve(req, w)
        } else {
            self.otherwise.serve(req, w)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Recorder;
    use http::Method;
    use std::sync::Mutex;

    /// Appends its tag on the request path; the terminal then appends "t".
    struct Mark {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Mark {
        fn wrap(&self, next: SharedHandler) -> SharedHandler {
            let tag = self.tag;
            let log = Arc::clone(&self.log);
            Arc::new(MarkHandler { tag, log, next })
        }
    }

    struct MarkHandler {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        next: SharedHandler,
    }

    impl Handler for MarkHandler {
        fn serve<'a>(
            &'a self,
            req: Request,
            w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            self.log.lock().unwrap().push(self.tag);
            self.next.serve(req, w)
        }
    }

    struct Terminal {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Handler for Terminal {
        fn serve<'a>(
            &'a self,
            _req: Request,
            _w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            self.log.lock().unwrap().push("terminal");
            Box::pin(async {})
        }
    }

    fn req() -> Request {
        Request::new(Method::GET, "/".parse().unwrap())
    }

    #[tokio::test]
    async fn registration_order_is_execution_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(Mark { tag: "m1", log: Arc::clone(&log) })
            .with(Mark { tag: "m2", log: Arc::clone(&log) })
            .with(Mark { tag: "m3", log: Arc::clone(&log) });

        let app = chain.handler(Arc::new(Terminal { log: Arc::clone(&log) }));
        let mut w = Recorder::new();
        app.serve(req(), &mut w).await;

        assert_eq!(*log.lock().unwrap(), ["m1", "m2", "m3", "terminal"]);
    }

    #[tokio::test]
    async fn composing_twice_is_side_effect_free() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(Mark { tag: "a", log: Arc::clone(&log) })
            .with(Mark { tag: "b", log: Arc::clone(&log) });

        let first = chain.handler(Arc::new(Terminal { log: Arc::clone(&log) }));
        let second = chain.handler(Arc::new(Terminal { log: Arc::clone(&log) }));

        let mut w = Recorder::new();
        first.serve(req(), &mut w).await;
        let mut w = Recorder::new();
        second.serve(req(), &mut w).await;

        assert_eq!(chain.len(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            ["a", "b", "terminal", "a", "b", "terminal"]
        );
    }

    #[tokio::test]
    async fn none_middleware_is_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let disabled: Option<Mark> = None;
        let chain = Chain::new()
            .with(disabled)
            .with(Mark { tag: "only", log: Arc::clone(&log) });

        let app = chain.handler(Arc::new(Terminal { log: Arc::clone(&log) }));
        let mut w = Recorder::new();
        app.serve(req(), &mut w).await;

        assert_eq!(*log.lock().unwrap(), ["only", "terminal"]);
    }

    #[tokio::test]
    async fn cond_picks_exactly_one_branch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cond = Cond::new(
            |req: &Request| req.uri().path().starts_with("/admin"),
            Mark { tag: "then", log: Arc::clone(&log) },
        )
        .otherwise(Mark { tag: "else", log: Arc::clone(&log) });

        let app = Chain::new()
            .with(cond)
            .handler(Arc::new(Terminal { log: Arc::clone(&log) }));

        let mut w = Recorder::new();
        app.serve(Request::new(Method::GET, "/admin/x".parse().unwrap()), &mut w)
            .await;
        let mut w = Recorder::new();
        app.serve(Request::new(Method::GET, "/public".parse().unwrap()), &mut w)
            .await;

        assert_eq!(
            *log.lock().unwrap(),
            ["then", "terminal", "else", "terminal"]
        );
    }

    #[tokio::test]
    async fn cond_without_otherwise_passes_through() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cond = Cond::new(|_: &Request| false, Mark { tag: "then", log: Arc::clone(&log) });

        let app = Chain::new()
            .with(cond)
            .handler(Arc::new(Terminal { log: Arc::clone(&log) }));

        let mut w = Recorder::new();
        app.serve(req(), &mut w).await;

        assert_eq!(*log.lock().unwrap(), ["terminal"]);
    }
}
