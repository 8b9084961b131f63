//! Application-level configuration.
//!
//! - [`CollaborationParams`]: per-session control (timeouts, retries, cross review, consensus)

pub mod collaboration_params;

pub use collaboration_params::{CollaborationParams, ConsensusMode};
