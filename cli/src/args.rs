//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for quorum-gateway
#[derive(Parser, Debug)]
#[command(name = "quorum-gateway")]
#[command(author, version, about = "Quorum gateway - run one task past several participant processes")]
#[command(long_about = r#"
quorum-gateway speaks line-delimited JSON-RPC on stdin/stdout. Each `invoke`
request runs one collaboration session over the configured participants:

1. Analysis: every participant analyzes the task in parallel
2. Cross review: each successful participant reviews the others' results
3. Consensus: results and reviews are synthesized into one answer

Participants are child processes speaking the same protocol on their stdio.
They are started on demand and stopped when the gateway exits.

Configuration files are loaded from (in priority order):
1. --config <path>               Explicit config file
2. ./quorum-gateway.toml         Project-level config
3. ~/.config/quorum-gateway/config.toml   Global config

Logs go to stderr (or --log-file); stdout carries only protocol messages.
"#)]
pub struct Cli {
    /// Restrict the default participants (can be specified multiple times)
    #[arg(short, long, value_name = "ID")]
    pub participant: Vec<String>,

    /// Skip the cross-review phase unless a request asks for it
    #[arg(long)]
    pub no_cross_review: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}
