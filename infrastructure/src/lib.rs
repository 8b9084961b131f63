//! Infrastructure layer for quorum-gateway
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: the JSON-RPC engine, participant processes and their
//! registry, the inbound gateway server, and configuration file loading.

pub mod config;
pub mod logging;
pub mod participant;
pub mod rpc;
pub mod server;

// Re-export commonly used types
pub use config::{
    ConfigLoader, FileCollaborationConfig, FileConfig, FileLifecycleConfig,
    FileParticipantConfig, FileServerConfig,
};
pub use logging::TracingProgress;
pub use participant::{
    ClientError, ClientOptions, ClientRegistry, CloseSummary, Launcher, ParticipantClient,
    ProcessLauncher, ProcessParticipantGateway,
};
pub use rpc::{FrameReader, LineWriter, RpcConnection, RpcError};
pub use server::{GatewayServer, StopReason, dispatch::ServerInfo};
