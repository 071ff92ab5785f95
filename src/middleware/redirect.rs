//! Canonical-host redirect.

use std::sync::Arc;

use http::{HeaderValue, StatusCode};

use crate::chain::Middleware;
use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Redirects `www.`-prefixed hosts to the bare domain.
///
/// `Host: www.example.com` with path `/p` becomes a `301` to
/// `https://example.com/p` (scheme taken from `x-forwarded-proto`, which a
/// fronting proxy sets; `https` otherwise). Every other host passes through
/// untouched.
pub struct NonWww {
    status: StatusCode,
}

impl NonWww {
    pub fn new() -> Self {
        Self {
            status: StatusCode::MOVED_PERMANENTLY,
        }
    }

    /// Overrides the redirect status, e.g. `307` while validating a rollout.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl Default for NonWww {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for NonWww {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        Arc::new(NonWwwHandler {
            status: self.status,
            next,
        })
    }
}

struct NonWwwHandler {
    status: StatusCode,
    next: SharedHandler,
}

impl Handler for NonWwwHandler {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        let stripped = req.host().strip_prefix("www.").map(str::to_owned);
        match stripped {
            Some(host) => Box::pin(async move {
                let proto = req.header("x-forwarded-proto").unwrap_or("https");
                let location = format!("{proto}://{host}{}", req.request_uri());
                match HeaderValue::from_str(&location) {
                    Ok(value) => {
                        w.headers_mut().insert(http::header::LOCATION, value);
                        w.write_head(self.status);
                    }
                    // unencodable host: let the request through rather than
                    // answer a redirect with no destination
                    Err(_) => self.next.serve(req, w).await,
                }
            }),
            None => self.next.serve(req, w),
        }
    }
}
