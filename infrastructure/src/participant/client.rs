//! Participant client: one spawned process behind one JSON-RPC connection.
//!
//! A client walks the lifecycle state machine:
//!
//! ```text
//! Spawning → Handshaking → Ready ⇄ InUse → Closing → Closed
//!                                              └──→ Failed
//! ```
//!
//! Teardown always runs the same escalation: pending calls are resolved as
//! terminated, the child's stdin is closed, the graceful signal is sent, and
//! after the grace window the process is killed and reaped.
//!
//! Unexpected exit is detected through end-of-stream on the child's stdout.
//! A background supervisor then tears the client down into `Failed`.

use super::error::{ClientError, Result};
use super::process::{Launcher, ProcessControl};
use crate::rpc::transport::DEFAULT_MAX_LINE_BYTES;
use crate::rpc::{FrameReader, LineWriter, RpcConnection, RpcError, TransportError};
use quorum_domain::{DomainError, LifecycleState, ParticipantId, SpawnSpec};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handshake method sent to every participant
pub const METHOD_INITIALIZE: &str = "initialize";

/// Protocol version announced during the handshake
pub const PROTOCOL_VERSION: &str = "1.0";

/// Upper bound on flushing and closing a participant's stdin during teardown
const STDIN_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Client timing and framing options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on the `initialize` round trip.
    pub handshake_timeout: Duration,
    /// Time a process gets to exit after the graceful signal.
    pub grace_period: Duration,
    pub max_line_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            grace_period: Duration::from_secs(5),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl ClientOptions {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }
}

struct ClientInner {
    id: ParticipantId,
    state: watch::Sender<LifecycleState>,
    connection: RpcConnection,
    process: Mutex<Box<dyn ProcessControl>>,
    in_flight: std::sync::Mutex<usize>,
    server_info: OnceLock<Value>,
    teardown_started: AtomicBool,
    /// Cancelled to skip the grace window
    force: CancellationToken,
    killed: AtomicBool,
    options: ClientOptions,
}

/// Handle to one participant process. Cheap to clone.
#[derive(Clone)]
pub struct ParticipantClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ParticipantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantClient")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl ParticipantClient {
    /// Launch a participant and complete the handshake.
    ///
    /// Returns once the client is Ready. On failure the process has already
    /// been torn down.
    pub async fn spawn(
        id: ParticipantId,
        spec: &SpawnSpec,
        launcher: &dyn Launcher,
        options: ClientOptions,
    ) -> Result<Self> {
        let (state, _) = watch::channel(LifecycleState::Spawning);
        Self::spawn_with_state(id, spec, launcher, options, state).await
    }

    /// Like [`spawn`](Self::spawn), publishing lifecycle changes on a
    /// caller-provided channel
    pub(crate) async fn spawn_with_state(
        id: ParticipantId,
        spec: &SpawnSpec,
        launcher: &dyn Launcher,
        options: ClientOptions,
        state: watch::Sender<LifecycleState>,
    ) -> Result<Self> {
        let launched = match launcher.launch(&id, spec).await {
            Ok(launched) => launched,
            Err(e) => {
                state.send_replace(LifecycleState::Failed);
                warn!("Failed to spawn participant {}: {}", id, e);
                return Err(ClientError::Spawn {
                    participant: id.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let connection = RpcConnection::start(
            id.as_str(),
            FrameReader::with_max_line_bytes(launched.reader, options.max_line_bytes),
            LineWriter::new(launched.writer),
        );

        let client = Self {
            inner: Arc::new(ClientInner {
                id,
                state,
                connection,
                process: Mutex::new(launched.process),
                in_flight: std::sync::Mutex::new(0),
                server_info: OnceLock::new(),
                teardown_started: AtomicBool::new(false),
                force: CancellationToken::new(),
                killed: AtomicBool::new(false),
                options,
            }),
        };

        Self::transition(&client.inner, LifecycleState::Handshaking)
            .map_err(|e| ClientError::ClientTerminated(e.to_string()))?;
        client.spawn_supervisor();
        client.handshake().await?;
        Ok(client)
    }

    async fn handshake(&self) -> Result<()> {
        let inner = &self.inner;
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "participant": inner.id.as_str(),
        });
        let timeout = inner.options.handshake_timeout;

        let error = match inner
            .connection
            .request(METHOD_INITIALIZE, params, timeout)
            .await
        {
            Ok(info) => {
                let _ = inner.server_info.set(info);
                return match Self::transition(inner, LifecycleState::Ready) {
                    Ok(()) => {
                        info!("Participant {} ready", inner.id);
                        Ok(())
                    }
                    Err(_) => Err(ClientError::Transport(format!(
                        "participant {} exited during handshake",
                        inner.id
                    ))),
                };
            }
            Err(RpcError::Timeout { .. }) => ClientError::HandshakeTimeout {
                participant: inner.id.to_string(),
                after: timeout,
            },
            Err(e @ (RpcError::Remote(_) | RpcError::Transport(TransportError::Codec(_)))) => {
                ClientError::from(e)
            }
            Err(e) => ClientError::Transport(format!("handshake failed: {}", e)),
        };

        warn!("Handshake with {} failed: {}", inner.id, error);
        inner.force.cancel();
        Self::teardown(inner, LifecycleState::Failed, "handshake failed").await;
        Err(error)
    }

    /// Validated state change; rejected transitions leave the state untouched
    fn transition(
        inner: &ClientInner,
        next: LifecycleState,
    ) -> std::result::Result<(), DomainError> {
        let mut outcome = Ok(());
        inner.state.send_if_modified(|current| match current.transition(next) {
            Ok(state) => {
                *current = state;
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// Watch for the connection closing underneath us
    fn spawn_supervisor(&self) {
        let weak = Arc::downgrade(&self.inner);
        let closed = self.inner.connection.closed_token();

        tokio::spawn(async move {
            closed.cancelled().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.teardown_started.load(Ordering::SeqCst) {
                return;
            }
            warn!("Participant {} exited unexpectedly", inner.id);
            Self::teardown(&inner, LifecycleState::Failed, "participant exited").await;
        });
    }

    // ==================== Calls ====================

    /// Issue one request and wait up to `timeout` for its response.
    ///
    /// Concurrent calls are correlated by id. Never retries.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let _guard = self.begin_call()?;
        debug!("Calling {} on {}", method, self.inner.id);
        self.inner
            .connection
            .request(method, params, timeout)
            .await
            .map_err(ClientError::from)
    }

    fn begin_call(&self) -> Result<CallGuard<'_>> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let state = self.state();
        if !state.accepts_calls() {
            return Err(ClientError::ClientTerminated(format!(
                "participant {} is {}",
                self.inner.id, state
            )));
        }
        if state == LifecycleState::Ready {
            let _ = Self::transition(&self.inner, LifecycleState::InUse);
        }
        *in_flight += 1;
        Ok(CallGuard { inner: &self.inner })
    }

    // ==================== Teardown ====================

    /// Close the participant and wait until it is gone
    pub async fn close(&self) {
        Self::teardown(&self.inner, LifecycleState::Closed, "closed by gateway").await;
    }

    /// Close without waiting out the grace window
    pub async fn force_kill(&self) {
        self.inner.force.cancel();
        Self::teardown(&self.inner, LifecycleState::Closed, "force killed").await;
    }

    async fn teardown(inner: &Arc<ClientInner>, end: LifecycleState, reason: &str) {
        if inner.teardown_started.swap(true, Ordering::SeqCst) {
            Self::wait_terminal_of(inner).await;
            return;
        }
        if let Err(e) = Self::transition(inner, LifecycleState::Closing) {
            debug!("Participant {}: {}", inner.id, e);
            return;
        }
        debug!("Closing participant {} ({})", inner.id, reason);

        // Never wait on a write stuck behind a full pipe before signalling
        inner.connection.abort(reason);
        let stdin_wait = inner.options.grace_period.min(STDIN_CLOSE_TIMEOUT);
        tokio::select! {
            biased;
            _ = inner.force.cancelled() => {}
            closed = tokio::time::timeout(stdin_wait, inner.connection.shutdown(reason)) => {
                if closed.is_err() {
                    debug!("Participant {}: stdin did not close, signalling anyway", inner.id);
                }
            }
        }

        let mut process = inner.process.lock().await;
        if let Err(e) = process.terminate() {
            debug!("Participant {}: failed to signal: {}", inner.id, e);
        }

        let grace = inner.options.grace_period;
        let exited = tokio::select! {
            biased;
            _ = inner.force.cancelled() => false,
            result = tokio::time::timeout(grace, process.wait()) => matches!(result, Ok(Ok(_))),
        };

        if !exited {
            if inner.force.is_cancelled() {
                debug!("Killing participant {}", inner.id);
            } else {
                warn!(
                    "Participant {} did not exit within {:?}, killing",
                    inner.id, grace
                );
            }
            inner.killed.store(true, Ordering::SeqCst);
            if let Err(e) = process.kill() {
                debug!("Participant {}: kill failed: {}", inner.id, e);
            }
            if let Err(e) = process.wait().await {
                debug!("Participant {}: wait failed: {}", inner.id, e);
            }
        }
        drop(process);

        if let Err(e) = Self::transition(inner, end) {
            warn!("Participant {}: {}", inner.id, e);
        }
        info!("Participant {} {}", inner.id, end);
    }

    /// Wait until the client is Closed or Failed
    pub async fn wait_terminal(&self) -> LifecycleState {
        Self::wait_terminal_of(&self.inner).await
    }

    async fn wait_terminal_of(inner: &ClientInner) -> LifecycleState {
        let mut rx = inner.state.subscribe();
        let state = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        state.unwrap_or(LifecycleState::Failed)
    }

    // ==================== Accessors ====================

    pub fn identity(&self) -> &ParticipantId {
        &self.inner.id
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// Subscribe to lifecycle changes
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    /// Result of the `initialize` handshake
    pub fn server_info(&self) -> Option<&Value> {
        self.inner.server_info.get()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.connection.in_flight()
    }

    /// Whether teardown had to escalate to an unconditional kill
    pub fn was_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same client record
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Returns the client to Ready when its last call settles
struct CallGuard<'a> {
    inner: &'a ClientInner,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 && *self.inner.state.borrow() == LifecycleState::InUse {
            let _ = ParticipantClient::transition(self.inner, LifecycleState::Ready);
        }
    }
}
