//! Built-in middleware.
//!
//! Everything here is an ordinary [`Middleware`](crate::Middleware) — the
//! same contract user code implements. The built-ins cover the cross-cutting
//! concerns a service behind a reverse proxy actually needs:
//!
//! - [`Block`] — a scoped sub-pipeline with its own not-found terminal
//! - [`Timeout`] — bounded response time, enforced by a concurrent watcher
//! - [`InterceptRequest`] / [`InterceptResponse`] — header interception at
//!   well-defined points
//! - [`Logger`] — one structured access-log line per request
//! - [`NonWww`] — canonical-host redirect
//! - [`compress`] — binding point for response compression

mod block;
mod compress;
mod headers;
mod logger;
mod redirect;
mod timeout;

pub use block::{Block, NotFound};
pub use compress::{br, br_with_quality, Noop};
pub use headers::{InterceptRequest, InterceptResponse};
pub use logger::Logger;
pub use redirect::NonWww;
pub use timeout::Timeout;
