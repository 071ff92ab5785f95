//! Bounded response time, enforced by a concurrent watcher.
//!
//! # The commit race
//!
//! Every request wrapped by [`Timeout`] carries a tiny state machine,
//! `Running → {Completed | TimedOut}`, guarded by one per-request lock that
//! also guards the real writer. Two parties race for the single transition
//! out of `Running`:
//!
//! - the **handler**, whose first status commit claims `Completed`;
//! - the **watcher**, a concurrent future racing a timer against a
//!   done-signal and the request's cancellation scope.
//!
//! Exactly one party wins. If the timer fires first, the watcher claims
//! `TimedOut`, cancels the request's scope (advisory — handlers that ignore
//! it keep running), and writes the terminal reply straight to the real
//! writer; the handler's buffered headers are discarded. Everything the
//! handler writes afterwards is reported as fully written and dropped, so a
//! late handler is never blocked on I/O it already lost.
//!
//! The watcher's lifetime is bounded by the request: the done-signal fires
//! at first commit, and dropping the decorated writer when the handler
//! returns releases it in every other case.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::sync::oneshot;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, Handler, SharedHandler};
use crate::request::Request;
use crate::writer::{Hijacked, NotSupported, ResponseWriter};

/// Terminal invoked when the timer wins; writes directly to the real writer.
pub type TimeoutReply =
    Arc<dyn for<'w> Fn(&'w mut (dyn ResponseWriter + 'w)) + Send + Sync>;

/// Middleware that guarantees a response within a fixed duration.
///
/// A zero duration disables the middleware entirely: it composes to the
/// identity and no watcher is ever started.
///
/// ```rust
/// use std::time::Duration;
/// use rampart::Chain;
/// use rampart::middleware::Timeout;
///
/// let chain = Chain::new().with(Timeout::new(Duration::from_secs(10)));
/// # let _ = chain;
/// ```
pub struct Timeout {
    duration: Duration,
    reply: TimeoutReply,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            reply: Arc::new(gateway_timeout),
        }
    }

    /// Replaces the default `504 Gateway Timeout` terminal.
    ///
    /// The reply runs under the race lock with the real writer — buffered
    /// decorations from the handler's side are already out of the picture.
    pub fn with_reply(
        mut self,
        reply: impl for<'w> Fn(&'w mut (dyn ResponseWriter + 'w)) + Send + Sync + 'static,
    ) -> Self {
        self.reply = Arc::new(reply);
        self
    }
}

/// The default terminal reply.
fn gateway_timeout(w: &mut (dyn ResponseWriter + '_)) {
    w.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    w.headers_mut().insert(
        http::header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    w.write_head(StatusCode::GATEWAY_TIMEOUT);
    let _ = w.write(b"Gateway Timeout");
}

impl Middleware for Timeout {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        if self.duration.is_zero() {
            return next;
        }
        Arc::new(TimeoutHandler {
            duration: self.duration,
            reply: Arc::clone(&self.reply),
            next,
        })
    }
}

// ── Race state ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RaceState {
    Running,
    Completed,
    TimedOut,
}

/// Everything the two racing parties share: the real writer and the state.
/// One lock, taken only for short synchronous sections.
struct Race<'w> {
    writer: &'w mut (dyn ResponseWriter + 'w),
    state: RaceState,
}

struct TimeoutHandler {
    duration: Duration,
    reply: TimeoutReply,
    next: SharedHandler,
}

impl Handler for TimeoutHandler {
    fn serve<'a>(
        &'a self,
        mut req: Request,
        w: &'a mut (dyn ResponseWriter + 'a),
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            // A child scope: the watcher can cancel everything further in
            // without touching the surrounding pipeline's scope.
            let scope = req.cancellation().child_token();
            req.set_cancellation(scope.clone());

            let (done_tx, done_rx) = oneshot::channel::<()>();
            let race = Mutex::new(Race {
                writer: w,
                state: RaceState::Running,
            });

            let mut tw = TimeoutWriter {
                headers: HeaderMap::new(),
                race: &race,
                done: Some(done_tx),
                committed: false,
            };

            let watcher = async {
                tokio::select! {
                    () = tokio::time::sleep(self.duration) => {
                        let mut guard = race.lock().expect("race lock poisoned");
                        if guard.state == RaceState::Running {
                            guard.state = RaceState::TimedOut;
                            scope.cancel();
                            (self.reply)(&mut *guard.writer);
                        }
                    }
                    // Resolves on first commit, or when the decorated writer
                    // is dropped at the end of the request.
                    _ = done_rx => {}
                    () = scope.cancelled() => {}
                }
            };

            let work = async move {
                self.next.serve(req, &mut tw).await;
                drop(tw);
            };

            tokio::join!(work, watcher);
        })
    }
}

// ── Decorated writer ──────────────────────────────────────────────────────────

/// The writer handed to the inner handler. Headers accumulate in a private
/// buffer and only reach the real writer if the handler wins the race.
struct TimeoutWriter<'r, 'w> {
    headers: HeaderMap,
    race: &'r Mutex<Race<'w>>,
    done: Option<oneshot::Sender<()>>,
    committed: bool,
}

impl ResponseWriter for TimeoutWriter<'_, '_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode) {
        let mut guard = self.race.lock().expect("race lock poisoned");
        if self.committed {
            return;
        }
        self.committed = true;
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        if guard.state == RaceState::TimedOut {
            return;
        }
        guard.state = RaceState::Completed;

        let race = &mut *guard;
        for (name, value) in self.headers.iter() {
            race.writer.headers_mut().append(name.clone(), value.clone());
        }
        race.writer.write_head(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.committed {
            self.write_head(StatusCode::OK);
        }
        let mut guard = self.race.lock().expect("race lock poisoned");
        if guard.state == RaceState::TimedOut {
            // Accepted, not forwarded: the handler lost the race.
            return Ok(buf.len());
        }
        guard.writer.write(buf)
    }

    fn flush(&mut self) {
        let mut guard = self.race.lock().expect("race lock poisoned");
        if guard.state != RaceState::TimedOut {
            guard.writer.flush();
        }
    }

    fn hijack(&mut self) -> Result<Hijacked, NotSupported> {
        self.race
            .lock()
            .expect("race lock poisoned")
            .writer
            .hijack()
    }

    fn push(&mut self, target: &str) -> Result<(), NotSupported> {
        self.race
            .lock()
            .expect("race lock poisoned")
            .writer
            .push(target)
    }
}
