//! Participant subdomain
//!
//! A participant is one externally spawned collaborator. This module holds
//! the identity that keys it, the spec used to launch it, and the lifecycle
//! its client moves through.

pub mod identity;
pub mod lifecycle;
pub mod spawn_spec;
