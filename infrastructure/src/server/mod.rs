//! Gateway server: the inbound JSON-RPC endpoint.
//!
//! Reads requests from one line transport (the process's stdin) and runs
//! each on its own task, so a long `invoke` never blocks `initialize` or a
//! second `invoke`. Responses go out through the shared [`LineWriter`].

pub mod dispatch;

use crate::rpc::{
    Envelope, ErrorCode, ErrorObject, FrameReader, Inbound, LineWriter, Request, Response,
    TransportError,
};
use dispatch::{
    METHOD_INITIALIZE, METHOD_INVOKE, METHOD_LIST_CAPABILITIES, METHOD_SHUTDOWN, ServerInfo,
};
use quorum_application::{NoProgress, ParticipantGateway, ProgressNotifier, RunCollaborationUseCase};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why [`GatewayServer::serve`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The client sent `shutdown`
    ShutdownRequested,
    /// The inbound stream ended
    InputClosed,
    /// The cancellation token fired
    Cancelled,
    /// The inbound stream failed
    TransportFailed,
}

/// JSON-RPC server in front of the collaboration use case
pub struct GatewayServer<G: ParticipantGateway + 'static> {
    use_case: RunCollaborationUseCase<G>,
    gateway: Arc<G>,
    progress: Arc<dyn ProgressNotifier>,
    info: ServerInfo,
    session_timeout: Option<Duration>,
}

impl<G: ParticipantGateway + 'static> GatewayServer<G> {
    pub fn new(use_case: RunCollaborationUseCase<G>, gateway: Arc<G>) -> Self {
        Self {
            use_case,
            gateway,
            progress: Arc::new(NoProgress),
            info: ServerInfo::default(),
            session_timeout: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressNotifier>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_server_info(mut self, info: ServerInfo) -> Self {
        self.info = info;
        self
    }

    /// Bound every `invoke` by an overall deadline
    pub fn with_session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Serve requests until `shutdown`, end of input, or cancellation.
    ///
    /// Requests already dispatched are allowed to finish before this returns.
    /// The writer is closed on the way out.
    pub async fn serve(
        self: Arc<Self>,
        mut reader: FrameReader,
        writer: Arc<LineWriter>,
        cancel: CancellationToken,
    ) -> StopReason {
        let mut in_flight = JoinSet::new();
        info!("Gateway server listening");

        let reason = loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                frame = reader.next_frame() => frame,
            };

            match frame {
                Ok(Some(Inbound::Envelope(Envelope::Request(request)))) => {
                    if request.method == METHOD_SHUTDOWN {
                        info!("Shutdown requested");
                        send(&writer, Response::success(request.id, Value::Null)).await;
                        break StopReason::ShutdownRequested;
                    }
                    let server = Arc::clone(&self);
                    let writer = Arc::clone(&writer);
                    in_flight.spawn(async move {
                        let response = server.handle(request).await;
                        send(&writer, response).await;
                    });
                }
                Ok(Some(Inbound::Envelope(Envelope::Notification(notification)))) => {
                    debug!("Ignoring notification {}", notification.method);
                }
                Ok(Some(Inbound::Envelope(Envelope::Response(response)))) => {
                    debug!("Dropping unsolicited response id={:?}", response.id);
                }
                Ok(Some(Inbound::Malformed(e))) => {
                    warn!("Malformed request: {}", e);
                    send(&writer, Response::error(e.id.clone(), e.to_error_object())).await;
                }
                Ok(None) => break StopReason::InputClosed,
                Err(e @ TransportError::LineTooLong { .. }) => {
                    warn!("Rejecting request: {}", e);
                    let error = ErrorObject::new(ErrorCode::ParseError, e.to_string());
                    send(&writer, Response::error(None, error)).await;
                    break StopReason::TransportFailed;
                }
                Err(e) => {
                    warn!("Inbound transport failed: {}", e);
                    break StopReason::TransportFailed;
                }
            }
        };

        if !in_flight.is_empty() {
            debug!("Waiting for {} in-flight requests", in_flight.len());
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                warn!("Request task failed: {}", e);
            }
        }
        writer.close().await;

        info!("Gateway server stopped ({:?})", reason);
        reason
    }

    async fn handle(&self, request: Request) -> Response {
        debug!("Request {} id={}", request.method, request.id);
        let outcome = match request.method.as_str() {
            METHOD_INITIALIZE => Ok(dispatch::initialize_result(&self.info)),
            METHOD_LIST_CAPABILITIES => Ok(dispatch::capabilities()),
            METHOD_INVOKE => self.invoke(request.params).await,
            other => Err(ErrorObject::new(
                ErrorCode::MethodNotFound,
                format!("Method not found: {}", other),
            )),
        };

        match outcome {
            Ok(result) => Response::success(request.id, result),
            Err(error) => Response::error(Some(request.id), error),
        }
    }

    async fn invoke(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
        let input = dispatch::parse_invoke(params)?;
        info!("Invoke: {}", input.task);

        let session = self
            .use_case
            .execute_with_progress(input, self.progress.as_ref());

        let result = match self.session_timeout {
            None => session.await,
            Some(limit) => {
                tokio::pin!(session);
                tokio::select! {
                    result = &mut session => result,
                    _ = tokio::time::sleep(limit) => {
                        warn!("Session exceeded {:?}, closing participants", limit);
                        self.gateway.shutdown().await;
                        return Err(ErrorObject::new(
                            ErrorCode::InternalError,
                            "session deadline exceeded",
                        ));
                    }
                }
            }
        };

        match result {
            Ok(result) => serde_json::to_value(&result).map_err(|e| {
                ErrorObject::new(
                    ErrorCode::InternalError,
                    format!("failed to encode session result: {}", e),
                )
            }),
            Err(e) => {
                warn!("Session failed: {}", e);
                Err(dispatch::session_error(&e))
            }
        }
    }
}

async fn send(writer: &LineWriter, response: Response) {
    if let Err(e) = writer.send(&response.into()).await {
        warn!("Failed to write response: {}", e);
    }
}
