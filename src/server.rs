//! HTTP server, graceful shutdown, and the hyper bridge.
//!
//! # Bridging writers onto hyper
//!
//! hyper wants a response *value* per request; the pipeline produces response
//! *writes*. The bridge between the two is [`HyperWriter`]: the composed
//! handler runs in its own task writing imperatively, the first status commit
//! sends `(status, headers)` over a oneshot back to the connection task, and
//! body writes stream `Bytes` over a channel rendered to hyper as an
//! [`http_body::Body`]. A handler that returns without committing yields
//! `200 OK` with whatever headers it buffered — the writer's drop finalizes
//! the head.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before SIGKILL. The server
//! reacts by immediately stopping `listener.accept()`, letting every
//! in-flight connection run to completion, and then returning from
//! [`Server::serve`]. Set the grace period longer than your slowest request.

use std::convert::Infallible;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};

use crate::error::Error;
use crate::handler::{Handler, SharedHandler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Starts accepting connections and dispatching them through `app` —
    /// typically `chain.handler(terminal)`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, app: impl Handler) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let app: SharedHandler = Arc::new(app);

        info!(addr = %self.addr, "rampart listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` makes select! check arms top-to-bottom; shutdown
                // is checked first so SIGTERM immediately stops accepting.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // called once per request on the connection, not once
                        // per connection
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req, remote_addr).await }
                        });

                        // auto::Builder negotiates HTTP/1.1 or HTTP/2
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: wait for every in-flight connection before returning.
        while tasks.join_next().await.is_some() {}

        info!("rampart stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the composed pipeline.
///
/// The error type is [`Infallible`] — every failure becomes a response, so
/// hyper never sees an error from us.
async fn dispatch(
    app: SharedHandler,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<ChannelBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(peer = %remote_addr, "request body read failed: {e}");
            return Ok(empty_response(StatusCode::BAD_REQUEST));
        }
    };

    let cancel = CancellationToken::new();
    let request = Request::from_parts(parts, body, remote_addr, cancel.clone());

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();
    let writer = HyperWriter {
        headers: HeaderMap::new(),
        head: Some(head_tx),
        body: body_tx,
    };

    // The handler gets its own task: it may stream long after the head is
    // returned to hyper, and a panic inside it must not take the connection
    // loop down with it.
    tokio::spawn(async move {
        let mut writer = writer;
        app.serve(request, &mut writer).await;
    });

    // Cancelled when this future is dropped pre-head (client gone early) or,
    // once transferred into the body, when the response stream is dropped.
    let scope = cancel.drop_guard();

    match head_rx.await {
        Ok((status, headers)) => {
            let mut resp = http::Response::new(ChannelBody {
                rx: body_rx,
                _scope: Some(scope),
            });
            *resp.status_mut() = status;
            *resp.headers_mut() = headers;
            Ok(resp)
        }
        // The writer finalizes the head even for silent handlers, so this
        // only happens if the handler task panicked before committing.
        Err(_) => Ok(empty_response(StatusCode::INTERNAL_SERVER_ERROR)),
    }
}

fn empty_response(status: StatusCode) -> http::Response<ChannelBody> {
    let (_, rx) = mpsc::unbounded_channel();
    let mut resp = http::Response::new(ChannelBody { rx, _scope: None });
    *resp.status_mut() = status;
    resp
}

// ── The real writer ───────────────────────────────────────────────────────────

/// The innermost [`ResponseWriter`]: everything the pipeline commits and
/// writes ends up here and is relayed to the connection task.
struct HyperWriter {
    headers: HeaderMap,
    head: Option<oneshot::Sender<(StatusCode, HeaderMap)>>,
    body: mpsc::UnboundedSender<Bytes>,
}

impl ResponseWriter for HyperWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        if let Some(head) = self.head.take() {
            let _ = head.send((status, mem::take(&mut self.headers)));
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.head.is_some() {
            self.write_head(StatusCode::OK);
        }
        self.body
            .send(Bytes::copy_from_slice(buf))
            .map(|()| buf.len())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    // flush is a no-op: frames leave as they are written. hijack and push
    // keep their default not-supported answers — this writer cannot hand out
    // the connection hyper owns.
}

impl Drop for HyperWriter {
    fn drop(&mut self) {
        // a handler that never committed still gets a response
        self.write_head(StatusCode::OK);
    }
}

// ── Streaming body ────────────────────────────────────────────────────────────

/// Response body fed by [`HyperWriter::write`], one frame per write.
struct ChannelBody {
    rx: mpsc::UnboundedReceiver<Bytes>,
    _scope: Option<DropGuard>,
}

impl http_body::Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        this.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|bytes| Ok(Frame::data(bytes))))
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by the Kubernetes control
/// plane) and **SIGINT** (Ctrl-C, for local dev). On Windows only Ctrl-C is
/// available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> (
        HyperWriter,
        oneshot::Receiver<(StatusCode, HeaderMap)>,
        mpsc::UnboundedReceiver<Bytes>,
    ) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let writer = HyperWriter {
            headers: HeaderMap::new(),
            head: Some(head_tx),
            body: body_tx,
        };
        (writer, head_rx, body_rx)
    }

    #[tokio::test]
    async fn commit_relays_status_and_header_snapshot() {
        let (mut w, head_rx, mut body_rx) = bridge();

        w.headers_mut()
            .insert("x-served-by", "rampart".parse().unwrap());
        w.write_head(StatusCode::CREATED);
        w.write_head(StatusCode::NOT_FOUND); // dropped
        let _ = w.write(b"abc");
        drop(w);

        let (status, headers) = head_rx.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers.get("x-served-by").unwrap(), "rampart");
        assert_eq!(body_rx.recv().await.unwrap(), Bytes::from_static(b"abc"));
        assert!(body_rx.recv().await.is_none()); // sender dropped → stream ends
    }

    #[tokio::test]
    async fn drop_without_commit_finalizes_200() {
        let (mut w, head_rx, _body_rx) = bridge();
        w.headers_mut().insert("x-buffered", "1".parse().unwrap());
        drop(w);

        let (status, headers) = head_rx.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("x-buffered").unwrap(), "1");
    }

    #[tokio::test]
    async fn write_after_client_disconnect_reports_broken_pipe() {
        let (mut w, _head_rx, body_rx) = bridge();
        drop(body_rx);
        w.write_head(StatusCode::OK);
        let err = w.write(b"too late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn channel_body_streams_frames_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Bytes::from_static(b"one ")).unwrap();
        tx.send(Bytes::from_static(b"two")).unwrap();
        drop(tx);

        let body = ChannelBody { rx, _scope: None };
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from_static(b"one two"));
    }
}
