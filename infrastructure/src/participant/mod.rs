//! Participant process adapter
//!
//! Implements [`ParticipantGateway`](quorum_application::ParticipantGateway)
//! over spawned child processes speaking line-delimited JSON-RPC on stdio.

pub mod client;
pub mod error;
pub mod gateway;
pub mod process;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientOptions, ParticipantClient};
pub use error::ClientError;
pub use gateway::ProcessParticipantGateway;
pub use process::{Launcher, ProcessLauncher};
pub use registry::{ClientRegistry, CloseSummary};
