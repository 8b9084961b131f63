//! Application layer for quorum-gateway
//!
//! This crate contains the collaboration use case, port definitions, and
//! application configuration. It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::{CollaborationParams, ConsensusMode};
pub use ports::{
    participant_gateway::{ParticipantError, ParticipantGateway},
    progress::{NoProgress, ProgressNotifier},
    spawn_spec::{SpawnSpecProvider, StaticSpawnSpecs},
};
pub use use_cases::run_collaboration::{
    RunCollaborationError, RunCollaborationInput, RunCollaborationUseCase,
};
