//! Request/response correlation over one line transport.
//!
//! [`RpcConnection`] owns the read side through a single background reader
//! task and shares the write side between callers. Outgoing requests are
//! registered in a [`PendingCalls`] table keyed by correlation id; the reader
//! task resolves them as responses arrive, in any order.
//!
//! Every registered call settles exactly once: with its response, with a
//! timeout, or with termination when the connection goes away.

use super::envelope::{Envelope, ErrorCode, ErrorObject, Request, RequestId, Response};
use super::transport::{FrameReader, Inbound, LineWriter, TransportError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Errors surfaced to the caller of [`RpcConnection::request`]
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("{method} timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("Remote error (code {}): {}", .0.code, .0.message)]
    Remote(ErrorObject),

    #[error("Connection terminated: {0}")]
    Terminated(String),

    #[error("Request id {0} is already in use")]
    DuplicateRequestId(u64),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

type Waiter = oneshot::Sender<Result<Value, RpcError>>;

/// What happened to an incoming response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Handed to the waiting caller
    Delivered,
    /// The caller gave up on this id earlier; discarded
    Late,
    /// No call was ever registered under this id; discarded
    Unknown,
}

#[derive(Default)]
struct PendingState {
    waiting: HashMap<u64, Waiter>,
    /// Ids whose caller gave up; reserved so they are never matched again
    abandoned: HashSet<u64>,
    terminated: Option<String>,
}

/// In-flight call table of one connection
#[derive(Default)]
pub struct PendingCalls {
    state: std::sync::Mutex<PendingState>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a call under `id`.
    ///
    /// An id that is pending or reserved is rejected and the existing entry
    /// is left untouched.
    pub fn register(
        &self,
        id: u64,
    ) -> Result<oneshot::Receiver<Result<Value, RpcError>>, RpcError> {
        let mut state = self.lock();
        if let Some(reason) = &state.terminated {
            return Err(RpcError::Terminated(reason.clone()));
        }
        if state.waiting.contains_key(&id) || state.abandoned.contains(&id) {
            return Err(RpcError::DuplicateRequestId(id));
        }
        let (tx, rx) = oneshot::channel();
        state.waiting.insert(id, tx);
        Ok(rx)
    }

    /// Settle the call registered under `id` with a response outcome
    pub fn resolve(&self, id: u64, outcome: Result<Value, ErrorObject>) -> Resolution {
        let waiter = {
            let mut state = self.lock();
            match state.waiting.remove(&id) {
                Some(waiter) => waiter,
                None if state.abandoned.contains(&id) => return Resolution::Late,
                None => return Resolution::Unknown,
            }
        };
        match waiter.send(outcome.map_err(RpcError::Remote)) {
            Ok(()) => Resolution::Delivered,
            Err(_) => Resolution::Late,
        }
    }

    /// Give up on a call; its id stays reserved
    pub fn abandon(&self, id: u64) {
        let mut state = self.lock();
        if state.waiting.remove(&id).is_some() {
            state.abandoned.insert(id);
        }
    }

    /// Drop a registration whose request never reached the wire
    pub fn forget(&self, id: u64) {
        self.lock().waiting.remove(&id);
    }

    /// Resolve every pending call with termination and refuse new ones.
    ///
    /// Returns the number of calls that were resolved.
    pub fn terminate_all(&self, reason: &str) -> usize {
        let waiters: Vec<Waiter> = {
            let mut state = self.lock();
            if state.terminated.is_none() {
                state.terminated = Some(reason.to_string());
            }
            state.waiting.drain().map(|(_, waiter)| waiter).collect()
        };
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Err(RpcError::Terminated(reason.to_string())));
        }
        count
    }

    pub fn in_flight(&self) -> usize {
        self.lock().waiting.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated.is_some()
    }
}

/// Abandons a registration if the request future is dropped before settling
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.abandon(self.id);
    }
}

/// A JSON-RPC peer reachable over one line transport
pub struct RpcConnection {
    label: String,
    writer: Arc<LineWriter>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl RpcConnection {
    /// Wrap a transport and start the background reader task.
    ///
    /// `label` names the peer in log lines.
    pub fn start(label: impl Into<String>, reader: FrameReader, writer: LineWriter) -> Self {
        let label = label.into();
        let writer = Arc::new(writer);
        let pending = Arc::new(PendingCalls::new());
        let closed = CancellationToken::new();

        tokio::spawn(Self::reader_loop(
            label.clone(),
            reader,
            Arc::clone(&writer),
            Arc::clone(&pending),
            closed.clone(),
        ));

        Self {
            label,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            closed,
        }
    }

    /// Background reader loop, sole owner of the read side.
    ///
    /// - **Response** → resolves the pending call with the same id
    /// - **Request** → answered with `MethodNotFound`
    /// - **Notification** → logged
    /// - **Malformed line** → logged, reading continues
    ///
    /// When the stream ends or fails every pending call is terminated and
    /// the `closed` token is cancelled.
    async fn reader_loop(
        label: String,
        mut reader: FrameReader,
        writer: Arc<LineWriter>,
        pending: Arc<PendingCalls>,
        closed: CancellationToken,
    ) {
        let reason = loop {
            let frame = tokio::select! {
                _ = closed.cancelled() => break "connection closed".to_string(),
                frame = reader.next_frame() => frame,
            };

            match frame {
                Ok(Some(Inbound::Envelope(Envelope::Response(response)))) => {
                    let Some(id) = response.id.as_ref().and_then(RequestId::as_u64) else {
                        warn!(
                            "{}: response with unusable id {:?}, dropping",
                            label, response.id
                        );
                        continue;
                    };
                    match pending.resolve(id, response.outcome) {
                        Resolution::Delivered => trace!("{}: resolved id={}", label, id),
                        Resolution::Late => debug!("{}: late response id={}, discarding", label, id),
                        Resolution::Unknown => {
                            warn!("{}: response for unknown id={}, dropping", label, id)
                        }
                    }
                }
                Ok(Some(Inbound::Envelope(Envelope::Request(request)))) => {
                    debug!("{}: rejecting incoming request method={}", label, request.method);
                    let response = Response::error(
                        Some(request.id),
                        ErrorObject::new(
                            ErrorCode::MethodNotFound,
                            format!("Method not found: {}", request.method),
                        ),
                    );
                    let envelope: Envelope = response.into();
                    let sent = tokio::select! {
                        _ = closed.cancelled() => break "connection closed".to_string(),
                        sent = writer.send(&envelope) => sent,
                    };
                    if let Err(e) = sent {
                        debug!("{}: failed to reject request: {}", label, e);
                    }
                }
                Ok(Some(Inbound::Envelope(Envelope::Notification(notification)))) => {
                    trace!("{}: notification method={}", label, notification.method);
                }
                Ok(Some(Inbound::Malformed(e))) => {
                    warn!("{}: malformed line ({}), skipping", label, e);
                }
                Ok(None) => break "stream closed".to_string(),
                Err(e) => {
                    warn!("{}: transport error: {}", label, e);
                    break e.to_string();
                }
            }
        };

        let terminated = pending.terminate_all(&reason);
        debug!(
            "{}: reader loop ended ({}), {} pending calls terminated",
            label, reason, terminated
        );
        closed.cancel();
    }

    /// Send a request with the next correlation id and await its response
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.request_with_id(id, method, params, timeout).await
    }

    /// Send a request under a caller-chosen correlation id.
    ///
    /// `timeout` bounds writing the request and awaiting its response
    /// together. Fails with [`RpcError::DuplicateRequestId`] if `id` is
    /// pending or was abandoned earlier.
    pub async fn request_with_id(
        &self,
        id: u64,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let rx = self.pending.register(id)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        let deadline = Instant::now() + timeout;
        let timed_out = || {
            debug!("{}: {} (id={}) timed out", self.label, method, id);
            RpcError::Timeout {
                method: method.to_string(),
                after: timeout,
            }
        };

        let envelope = Envelope::Request(Request::new(id, method, params));
        let send = async {
            tokio::select! {
                _ = self.closed.cancelled() => Err(self.terminated()),
                sent = self.writer.send(&envelope) => sent.map_err(|e| {
                    if self.pending.is_terminated() {
                        self.terminated()
                    } else {
                        RpcError::from(e)
                    }
                }),
            }
        };
        match tokio::time::timeout_at(deadline, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.pending.forget(id);
                return Err(e);
            }
            Err(_) => {
                if self.writer.is_closed() {
                    // Part of the line may be on the wire
                    warn!("{}: write of {} (id={}) cut off, closing", self.label, method, id);
                    self.abort("request write cut off");
                }
                return Err(timed_out());
            }
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::Terminated("connection dropped".to_string())),
            Err(_) => Err(timed_out()),
        }
    }

    fn terminated(&self) -> RpcError {
        RpcError::Terminated(format!("{} connection closed", self.label))
    }

    pub fn in_flight(&self) -> usize {
        self.pending.in_flight()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled once the connection is gone, for whatever reason
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Wait until the connection is gone
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Terminate pending calls, refuse new writes and stop the reader.
    ///
    /// Does not wait for anything, so it works even while a write is stuck
    /// on a peer that stopped reading.
    pub fn abort(&self, reason: &str) {
        let terminated = self.pending.terminate_all(reason);
        if terminated > 0 {
            debug!(
                "{}: {} pending calls terminated ({})",
                self.label, terminated, reason
            );
        }
        self.writer.mark_closed();
        self.closed.cancel();
    }

    /// [`abort`](Self::abort), then flush and close the write side
    pub async fn shutdown(&self, reason: &str) {
        self.abort(reason);
        self.writer.close().await;
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::codec;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    /// Connection plus the remote ends of its transport
    fn connect() -> (RpcConnection, BufReader<DuplexStream>, DuplexStream) {
        let (local_read, remote_write) = duplex(4096);
        let (remote_read, local_write) = duplex(4096);
        let conn = RpcConnection::start(
            "test-peer",
            FrameReader::new(local_read),
            LineWriter::new(local_write),
        );
        (conn, BufReader::new(remote_read), remote_write)
    }

    async fn read_request(remote: &mut BufReader<DuplexStream>) -> Request {
        let mut line = String::new();
        remote.read_line(&mut line).await.unwrap();
        match codec::decode(line.trim_end()).unwrap() {
            Envelope::Request(r) => r,
            other => panic!("expected request, got {other:?}"),
        }
    }

    async fn reply(remote: &mut DuplexStream, response: Response) {
        let mut line = codec::encode(&response.into()).unwrap();
        line.push('\n');
        remote.write_all(line.as_bytes()).await.unwrap();
    }

    #[test]
    fn duplicate_registration_keeps_first_call() {
        let pending = PendingCalls::new();
        let mut first = pending.register(1).unwrap();

        assert!(matches!(
            pending.register(1),
            Err(RpcError::DuplicateRequestId(1))
        ));

        assert_eq!(pending.resolve(1, Ok(json!("first"))), Resolution::Delivered);
        assert_eq!(first.try_recv().unwrap().unwrap(), json!("first"));
    }

    #[test]
    fn abandoned_id_stays_reserved() {
        let pending = PendingCalls::new();
        let _rx = pending.register(3).unwrap();
        pending.abandon(3);

        assert_eq!(pending.resolve(3, Ok(json!(1))), Resolution::Late);
        assert!(matches!(
            pending.register(3),
            Err(RpcError::DuplicateRequestId(3))
        ));
        assert_eq!(pending.resolve(99, Ok(json!(1))), Resolution::Unknown);
    }

    #[test]
    fn terminate_all_settles_everything() {
        let pending = PendingCalls::new();
        let mut a = pending.register(1).unwrap();
        let mut b = pending.register(2).unwrap();

        assert_eq!(pending.terminate_all("gone"), 2);
        assert!(matches!(a.try_recv().unwrap(), Err(RpcError::Terminated(_))));
        assert!(matches!(b.try_recv().unwrap(), Err(RpcError::Terminated(_))));
        assert!(matches!(pending.register(3), Err(RpcError::Terminated(_))));
        assert_eq!(pending.in_flight(), 0);
    }

    #[tokio::test]
    async fn responses_match_by_id_in_any_order() {
        let (conn, mut remote_in, mut remote_out) = connect();
        let conn = Arc::new(conn);

        let c1 = Arc::clone(&conn);
        let first = tokio::spawn(async move {
            c1.request("analyze", json!({"n": 1}), Duration::from_secs(5)).await
        });
        let r1 = read_request(&mut remote_in).await;

        let c2 = Arc::clone(&conn);
        let second = tokio::spawn(async move {
            c2.request("analyze", json!({"n": 2}), Duration::from_secs(5)).await
        });
        let r2 = read_request(&mut remote_in).await;
        assert_ne!(r1.id, r2.id);

        reply(&mut remote_out, Response::success(r2.id.clone(), json!("two"))).await;
        reply(&mut remote_out, Response::success(r1.id.clone(), json!("one"))).await;

        assert_eq!(first.await.unwrap().unwrap(), json!("one"));
        assert_eq!(second.await.unwrap().unwrap(), json!("two"));
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let (conn, mut remote_in, mut remote_out) = connect();

        let call = conn.request("analyze", json!({}), Duration::from_secs(5));
        let remote = async {
            let request = read_request(&mut remote_in).await;
            reply(
                &mut remote_out,
                Response::error(
                    Some(request.id),
                    ErrorObject {
                        code: -32001,
                        message: "overloaded".into(),
                        data: None,
                    },
                ),
            )
            .await;
        };
        let (result, ()) = tokio::join!(call, remote);

        match result {
            Err(RpcError::Remote(e)) => {
                assert_eq!(e.code, -32001);
                assert_eq!(e.message, "overloaded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_reserves_id_and_late_response_is_dropped() {
        let (conn, mut remote_in, mut remote_out) = connect();

        let err = conn
            .request("analyze", json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));
        let late = read_request(&mut remote_in).await;

        // The late answer must not satisfy the next call
        let call = conn.request("analyze", json!({}), Duration::from_secs(5));
        let remote = async {
            reply(&mut remote_out, Response::success(late.id.clone(), json!("late"))).await;
            let next = read_request(&mut remote_in).await;
            reply(&mut remote_out, Response::success(next.id, json!("fresh"))).await;
        };
        let (result, ()) = tokio::join!(call, remote);
        assert_eq!(result.unwrap(), json!("fresh"));

        let late_id = late.id.as_u64().unwrap();
        assert!(matches!(
            conn.request_with_id(late_id, "x", json!({}), Duration::from_millis(10))
                .await,
            Err(RpcError::DuplicateRequestId(_))
        ));
    }

    #[tokio::test]
    async fn eof_terminates_pending_calls() {
        let (conn, mut remote_in, remote_out) = connect();

        let call = conn.request("analyze", json!({}), Duration::from_secs(30));
        let remote = async {
            read_request(&mut remote_in).await;
            drop(remote_out);
        };
        let started = std::time::Instant::now();
        let (result, ()) = tokio::join!(call, remote);

        assert!(matches!(result, Err(RpcError::Terminated(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        conn.closed().await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn incoming_request_gets_method_not_found() {
        let (_conn, mut remote_in, mut remote_out) = connect();

        let request = Request::new(77u64, "sampling/create", json!({}));
        let mut line = codec::encode(&request.into()).unwrap();
        line.push('\n');
        remote_out.write_all(line.as_bytes()).await.unwrap();

        let mut answer = String::new();
        remote_in.read_line(&mut answer).await.unwrap();
        match codec::decode(answer.trim_end()).unwrap() {
            Envelope::Response(r) => {
                assert_eq!(r.id, Some(RequestId::Number(77)));
                assert_eq!(
                    r.outcome.unwrap_err().code,
                    ErrorCode::MethodNotFound.code()
                );
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_terminates_and_refuses_new_calls() {
        let (conn, mut remote_in, _remote_out) = connect();
        let conn = Arc::new(conn);

        let c = Arc::clone(&conn);
        let call = tokio::spawn(async move {
            c.request("analyze", json!({}), Duration::from_secs(30)).await
        });
        read_request(&mut remote_in).await;

        conn.shutdown("closed by test").await;
        assert!(matches!(call.await.unwrap(), Err(RpcError::Terminated(_))));
        assert!(matches!(
            conn.request("analyze", json!({}), Duration::from_secs(1)).await,
            Err(RpcError::Terminated(_))
        ));
    }

    /// Connection whose peer never reads, over pipes of `capacity` bytes
    fn connect_stalled(capacity: usize) -> (RpcConnection, DuplexStream, DuplexStream) {
        let (local_read, remote_write) = duplex(capacity);
        let (remote_read, local_write) = duplex(capacity);
        let conn = RpcConnection::start(
            "stalled-peer",
            FrameReader::new(local_read),
            LineWriter::new(local_write),
        );
        (conn, remote_read, remote_write)
    }

    #[tokio::test]
    async fn timeout_covers_a_stalled_write() {
        let (conn, _remote_read, _remote_write) = connect_stalled(1024);

        let started = std::time::Instant::now();
        let err = conn
            .request(
                "analyze",
                json!({"task": "x".repeat(64 * 1024)}),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));

        // A half-written line ruins the framing for every later request
        conn.closed().await;
        assert!(matches!(
            conn.request("ping", json!({}), Duration::from_secs(1)).await,
            Err(RpcError::Terminated(_))
        ));
    }

    #[tokio::test]
    async fn caller_queued_behind_stalled_write_times_out() {
        let (conn, _remote_read, _remote_write) = connect_stalled(1024);
        let conn = Arc::new(conn);

        let c = Arc::clone(&conn);
        let stuck = tokio::spawn(async move {
            c.request(
                "analyze",
                json!({"task": "x".repeat(64 * 1024)}),
                Duration::from_secs(30),
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let queued = tokio::time::timeout(
            Duration::from_secs(2),
            conn.request("ping", json!({}), Duration::from_millis(100)),
        )
        .await
        .unwrap();
        assert!(matches!(queued, Err(RpcError::Timeout { .. })));

        // Aborting never waits for the stuck write
        conn.abort("closed by test");
        let stuck = tokio::time::timeout(Duration::from_secs(2), stuck)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(stuck, Err(RpcError::Terminated(_))));
        assert!(conn.is_closed());
    }
}
