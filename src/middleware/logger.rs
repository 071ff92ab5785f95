//! Structured access log: one JSON line per request.
//!
//! The logger decorates the writer read-only — it watches the committed
//! status and counts body bytes, then emits a single record when the request
//! completes, whatever the outcome. Logging is best-effort by contract:
//! serialization or sink failures are noted at debug level and never alter
//! the request.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::{Hijacked, NotSupported, ResponseWriter};

/// Status recorded for requests whose scope was cancelled before any commit
/// (the client went away first).
const STATUS_CLIENT_CLOSED: u16 = 499;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Access-log middleware.
///
/// ```rust
/// use rampart::Chain;
/// use rampart::middleware::Logger;
///
/// let chain = Chain::new().with(Logger::stdout());
/// # let _ = chain;
/// ```
pub struct Logger {
    sink: Sink,
}

impl Logger {
    pub fn stdout() -> Self {
        Self::with_sink(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::with_sink(io::stderr())
    }

    /// Logs to an arbitrary sink. The sink is shared across concurrent
    /// requests; each record is written under a short lock so lines never
    /// interleave.
    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }
}

impl Middleware for Logger {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        Arc::new(LoggerHandler {
            sink: Arc::clone(&self.sink),
            next,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessRecord {
    timestamp: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    host: String,
    request_method: String,
    request_url: String,
    request_body_size: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    referer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    user_agent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    remote_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    real_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    forwarded_for: String,
    duration: u64,
    duration_human: String,
    status: u16,
    response_body_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_first_byte: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_first_byte_human: Option<String>,
}

struct LoggerHandler {
    sink: Sink,
    next: SharedHandler,
}

impl Handler for LoggerHandler {
    fn serve<'a>(
        &'a self,
        req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

            let proto = req.header("x-forwarded-proto").unwrap_or("http");
            let request_url = format!("{}://{}{}", proto, req.host(), req.request_uri());
            let host = req.host().to_owned();
            let request_method = req.method().as_str().to_owned();
            let request_body_size = req.content_length();
            let referer = req.header("referer").unwrap_or("").to_owned();
            let user_agent = req.header("user-agent").unwrap_or("").to_owned();
            let remote_ip = req
                .remote_addr()
                .map(|a| a.ip().to_string())
                .unwrap_or_default();
            let real_ip = req.header("x-real-ip").unwrap_or("").to_owned();
            let forwarded_for = req.header("x-forwarded-for").unwrap_or("").to_owned();
            let cancel = req.cancellation().clone();

            let mut lw = LogWriter {
                inner: w,
                status: None,
                bytes: 0,
                committed_at: None,
            };
            self.next.serve(req, &mut lw).await;

            let duration = started.elapsed();
            let status = match lw.status {
                Some(s) => s.as_u16(),
                None if cancel.is_cancelled() => STATUS_CLIENT_CLOSED,
                None => 0,
            };
            let ttfb = lw.committed_at.map(|at| at.duration_since(started));

            let record = AccessRecord {
                timestamp,
                host,
                request_method,
                request_url,
                request_body_size,
                referer,
                user_agent,
                remote_ip,
                real_ip,
                forwarded_for,
                duration: duration.as_nanos() as u64,
                duration_human: format!("{duration:?}"),
                status,
                response_body_size: lw.bytes,
                time_to_first_byte: ttfb.map(|d| d.as_nanos() as u64),
                time_to_first_byte_human: ttfb.map(|d| format!("{d:?}")),
            };

            let mut sink = self.sink.lock().expect("log sink lock poisoned");
            if let Err(err) = serde_json::to_writer(&mut *sink, &record)
                .map_err(io::Error::from)
                .and_then(|()| sink.write_all(b"\n"))
            {
                debug!("access log write failed: {err}");
            }
        })
    }
}

/// Read-only decoration: observes the committed status, the commit instant
/// and the forwarded byte count.
struct LogWriter<'w> {
    inner: &'w mut (dyn ResponseWriter + 'w),
    status: Option<StatusCode>,
    bytes: u64,
    committed_at: Option<Instant>,
}

impl ResponseWriter for LogWriter<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.committed_at = Some(Instant::now());
        self.inner.write_head(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
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

    /// Cloneable in-memory sink so the test keeps a handle on the output.
    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buf {
        fn record(&self) -> serde_json::Value {
            let bytes = self.0.lock().unwrap().clone();
            let line = std::str::from_utf8(&bytes).unwrap().trim().to_owned();
            serde_json::from_str(&line).unwrap()
        }
    }

    struct Ok200;

    impl Handler for Ok200 {
        fn serve<'a>(
            &'a self,
            _req: Request,
            w: &'a mut (dyn ResponseWriter + 'a),
        ) -> BoxFuture<'a> {
            Box::pin(async move {
                let _ = w.write(b"hello world");
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

    #[tokio::test]
    async fn emits_one_record_with_request_and_response_fields() {
        let buf = Buf::default();
        let app = Logger::with_sink(buf.clone()).wrap(Arc::new(Ok200));

        let mut req = Request::new(Method::GET, "/p?q=1".parse().unwrap());
        req.headers_mut().insert("host", "api.example".parse().unwrap());
        req.headers_mut()
            .insert("x-forwarded-proto", "https".parse().unwrap());
        req.headers_mut()
            .insert("user-agent", "curl/8".parse().unwrap());
        req.set_remote_addr("10.0.0.9:55000".parse().unwrap());

        let mut w = Recorder::new();
        app.serve(req, &mut w).await;

        let record = buf.record();
        assert_eq!(record["requestMethod"], "GET");
        assert_eq!(record["host"], "api.example");
        assert_eq!(record["requestUrl"], "https://api.example/p?q=1");
        assert_eq!(record["userAgent"], "curl/8");
        assert_eq!(record["remoteIp"], "10.0.0.9");
        assert_eq!(record["status"], 200);
        assert_eq!(record["responseBodySize"], 11);
        assert!(record["timeToFirstByte"].is_number());
        // empty optional fields are omitted, not serialized as ""
        assert!(record.get("referer").is_none());
    }

    #[tokio::test]
    async fn cancelled_before_status_records_499() {
        let buf = Buf::default();
        let app = Logger::with_sink(buf.clone()).wrap(Arc::new(Silent));

        let req = Request::new(Method::GET, "/".parse().unwrap());
        req.cancellation().cancel();

        let mut w = Recorder::new();
        app.serve(req, &mut w).await;

        let record = buf.record();
        assert_eq!(record["status"], 499);
        assert_eq!(record["responseBodySize"], 0);
        assert!(record.get("timeToFirstByte").is_none());
    }
}
