//! Collaboration orchestration domain
//!
//! This module contains the session entity the orchestrator fills in phase
//! by phase, the result types it returns, and local consensus aggregation.

pub mod consensus;
pub mod entities;
pub mod value_objects;
