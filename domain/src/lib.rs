//! Domain layer for quorum-gateway
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Participants
//!
//! A participant is an externally spawned collaborator addressed by a stable
//! [`ParticipantId`]. Its client moves through a strict [`LifecycleState`]
//! machine from spawn to teardown.
//!
//! ## Collaboration
//!
//! A [`CollaborationSession`] runs three phases: parallel analysis, optional
//! cross review, and consensus synthesis. Failures are isolated per
//! participant and recorded as [`ParticipantFailure`]s.

pub mod config;
pub mod core;
pub mod orchestration;
pub mod participant;

// Re-export commonly used types
pub use config::{ConfigIssue, ConfigIssueCode, Severity};
pub use crate::core::{error::DomainError, task::Task};
pub use orchestration::{
    entities::{CollaborationSession, Phase},
    value_objects::{
        Consensus, ConsensusStrategy, FailureKind, ParticipantFailure, Perspective, SessionResult,
    },
};
pub use participant::{
    identity::ParticipantId, lifecycle::LifecycleState, spawn_spec::SpawnSpec,
};
