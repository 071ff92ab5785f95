//! Radix-tree request router — the usual terminal of a chain.
//!
//! One tree per HTTP method, O(path-length) lookup. The router is a plain
//! [`Handler`], so it slots in wherever a terminal is expected:
//! `chain.handler(Arc::new(router))`.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// The application router.
///
/// Build it once at startup; registrations chain naturally because each
/// [`Router::on`] call returns `self`. Path parameters use `{name}` syntax
/// and are retrieved with `req.param("name")`.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<SharedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics on a malformed route pattern — routes are static configuration
    /// and a bad one is a programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(SharedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Handler for Router {
    fn serve<'a>(
        &'a self,
        mut req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        match self.lookup(req.method(), req.uri().path()) {
            Some((handler, params)) => {
                req.set_params(params);
                Box::pin(async move { handler.serve(req, w).await })
            }
            None => Box::pin(async move {
                w.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                w.write_head(StatusCode::NOT_FOUND);
                let _ = w.write(b"not found");
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFunc;
    use crate::writer::Recorder;

    fn show_id<'a>(req: Request, w: &'a mut (dyn ResponseWriter + 'a)) -> BoxFuture<'a> {
        Box::pin(async move {
            let id = req.param("id").unwrap_or("?").to_owned();
            let _ = w.write(id.as_bytes());
        })
    }

    #[tokio::test]
    async fn routes_by_method_and_path_with_params() {
        let router = Router::new().on(Method::GET, "/users/{id}", HandlerFunc(show_id));

        let mut w = Recorder::new();
        router
            .serve(Request::new(Method::GET, "/users/42".parse().unwrap()), &mut w)
            .await;
        assert_eq!(w.body_str(), "42");

        let mut w = Recorder::new();
        router
            .serve(Request::new(Method::POST, "/users/42".parse().unwrap()), &mut w)
            .await;
        assert_eq!(w.status(), Some(StatusCode::NOT_FOUND));
    }
}
