//! Core domain concepts shared across all subdomains.
//!
//! - [`task::Task`]: a validated analysis task handed to participants
//! - [`error::DomainError`]: domain-level errors

pub mod error;
pub mod task;
