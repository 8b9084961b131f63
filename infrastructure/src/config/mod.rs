//! Configuration file loading for quorum-gateway
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `--config <path>` specified file
//! 2. Project root: `./quorum-gateway.toml` or `./.quorum-gateway.toml`
//! 3. XDG config: `$XDG_CONFIG_HOME/quorum-gateway/config.toml`
//! 4. Default values

mod file_config;
mod loader;

pub use file_config::{
    FileCollaborationConfig, FileConfig, FileLifecycleConfig, FileParticipantConfig,
    FileServerConfig,
};
pub use loader::ConfigLoader;
