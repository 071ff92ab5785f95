//! The response-writer protocol.
//!
//! Handlers never build a response value — they *write* one, through a
//! [`ResponseWriter`]. Every instrumenting middleware (timeout, logging,
//! header interception) wraps the writer it was given and hands the wrapped
//! writer to the next stage, so instrumentation composes the same way
//! handlers do.
//!
//! # The commit
//!
//! A response has exactly one status line. [`write_head`](ResponseWriter::write_head)
//! is therefore idempotent: the first call wins, later calls are silently
//! dropped. [`write`](ResponseWriter::write) commits `200 OK` implicitly if
//! nothing was committed yet — the same contract handlers already know from
//! every mainstream HTTP stack.
//!
//! # Optional capabilities
//!
//! Flush, connection takeover and server push are capabilities a concrete
//! writer may or may not have. The default trait methods *are* the capability
//! query: a writer that does not override them reports a no-op flush and an
//! explicit [`NotSupported`] for takeover and push. Decorators forward these
//! methods to the writer they wrap, so the innermost writer's answer is
//! authoritative — a capability is never silently invented along the way.

use std::fmt;
use std::io;

use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The capability set every handler writes a response through.
///
/// Implementors must keep [`write_head`](Self::write_head) idempotent and
/// must commit `200 OK` on the first [`write`](Self::write) if no status was
/// committed yet. Decorators should override only the operations they
/// instrument and forward the rest.
pub trait ResponseWriter: Send {
    /// The mutable header map accumulated so far.
    ///
    /// Decorators may return a private buffer here; the buffered headers
    /// reach the real writer as a snapshot at commit time.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line and the current header snapshot.
    ///
    /// First call wins. Subsequent calls are no-ops, not errors.
    fn write_head(&mut self, status: StatusCode);

    /// Writes body bytes, committing `200 OK` first if nothing was committed.
    ///
    /// Returns the number of bytes accepted. A writer that has lost a commit
    /// race reports the full length and discards the bytes, so a running
    /// handler is never blocked on I/O it can no longer influence.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Flushes buffered bytes toward the client. No-op unless the underlying
    /// writer streams.
    fn flush(&mut self) {}

    /// Takes over the underlying connection for raw I/O (e.g. upgrades).
    fn hijack(&mut self) -> Result<Hijacked, NotSupported> {
        Err(NotSupported("hijack"))
    }

    /// Initiates a server push for `target`.
    fn push(&mut self, target: &str) -> Result<(), NotSupported> {
        let _ = target;
        Err(NotSupported("push"))
    }
}

// ── Capability errors ─────────────────────────────────────────────────────────

/// An optional writer capability was invoked on a writer that lacks it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NotSupported(pub(crate) &'static str);

impl fmt::Display for NotSupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not supported by this response writer", self.0)
    }
}

impl std::error::Error for NotSupported {}

// ── Hijack ────────────────────────────────────────────────────────────────────

/// Byte stream obtained by taking over the connection.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

/// The raw connection handed out by a successful [`ResponseWriter::hijack`].
///
/// Once hijacked, the HTTP layer stops touching the connection; the caller
/// owns framing from here on.
pub struct Hijacked {
    pub stream: Box<dyn RawStream>,
}

// ── Recorder ──────────────────────────────────────────────────────────────────

/// An in-memory [`ResponseWriter`] that records everything written to it.
///
/// This is the "real writer" to use in middleware tests: run a composed
/// handler against a `Recorder`, then assert on the committed status, the
/// header snapshot and the body bytes.
///
/// ```rust
/// use rampart::writer::Recorder;
/// use rampart::ResponseWriter;
/// use http::StatusCode;
///
/// let mut w = Recorder::new();
/// w.write_head(StatusCode::CREATED);
/// w.write_head(StatusCode::NOT_FOUND); // dropped: first commit wins
/// w.write(b"hello").unwrap();
/// assert_eq!(w.status(), Some(StatusCode::CREATED));
/// assert_eq!(w.body(), b"hello");
/// ```
#[derive(Default)]
pub struct Recorder {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
    flushes: usize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, or `None` if nothing was committed.
    pub fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(s, _)| *s)
    }

    /// The header snapshot taken at commit time.
    pub fn committed_headers(&self) -> Option<&HeaderMap> {
        self.committed.as_ref().map(|(_, h)| h)
    }

    /// Everything written after the commit.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body interpreted as UTF-8, for assertion convenience.
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("<non-utf8>")
    }

    /// How many times [`flush`](ResponseWriter::flush) was called.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ResponseWriter for Recorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.committed.is_none() {
            self.committed = Some((status, self.headers.clone()));
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.committed.is_none() {
            self.write_head(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_commit_wins() {
        let mut w = Recorder::new();
        w.headers_mut()
            .insert(http::header::ETAG, "\"v1\"".parse().unwrap());
        w.write_head(StatusCode::ACCEPTED);
        w.headers_mut()
            .insert(http::header::ETAG, "\"v2\"".parse().unwrap());
        w.write_head(StatusCode::BAD_GATEWAY);

        assert_eq!(w.status(), Some(StatusCode::ACCEPTED));
        // the snapshot is taken at commit time, later mutation is invisible
        assert_eq!(
            w.committed_headers().unwrap().get(http::header::ETAG).unwrap(),
            "\"v1\""
        );
    }

    #[test]
    fn write_commits_200_implicitly() {
        let mut w = Recorder::new();
        assert_eq!(w.write(b"body").unwrap(), 4);
        assert_eq!(w.status(), Some(StatusCode::OK));
        assert_eq!(w.body(), b"body");
    }

    #[test]
    fn default_capabilities_degrade_explicitly() {
        let mut w = Recorder::new();
        w.flush(); // recorder supports flush; counts it
        assert_eq!(w.flushes(), 1);
        assert_eq!(w.hijack().err(), Some(NotSupported("hijack")));
        assert_eq!(w.push("/style.css").err(), Some(NotSupported("push")));
    }
}
