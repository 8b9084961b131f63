//! CLI entrypoint for quorum-gateway
//!
//! This is the main binary that wires together all layers using
//! dependency injection, then serves JSON-RPC on stdin/stdout.

mod args;

use anyhow::{Context, Result, anyhow, bail};
use args::Cli;
use clap::Parser;
use quorum_application::{RunCollaborationUseCase, SpawnSpecProvider, StaticSpawnSpecs};
use quorum_domain::ParticipantId;
use quorum_infrastructure::{
    ClientRegistry, ConfigLoader, FileConfig, FrameReader, GatewayServer, LineWriter,
    ProcessLauncher, ProcessParticipantGateway, ServerInfo, TracingProgress,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    if cli.show_config {
        show_config(&cli);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    // A pending stdin read never returns on its own
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

/// Install the tracing subscriber; logs never go to stdout
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("invalid log file path: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

fn load_config(cli: &Cli) -> Result<FileConfig> {
    if cli.no_config {
        return Ok(ConfigLoader::load_defaults());
    }
    ConfigLoader::load(cli.config.as_ref()).map_err(|e| anyhow!("Failed to load configuration: {}", e))
}

fn show_config(cli: &Cli) {
    print!("{}", ConfigLoader::describe_sources(cli.config.as_ref()));

    match load_config(cli) {
        Ok(config) => {
            println!();
            println!("Participants:");
            for participant in &config.participants {
                println!("  {:<20} {}", participant.id, participant.to_spawn_spec().display_command());
            }
            for issue in config.validate() {
                println!("  {:?}: {}", issue.severity, issue.message);
            }
        }
        Err(e) => println!("\n{}", e),
    }
}

/// Log every config issue; fail if any of them is an error
fn check_config(config: &FileConfig) -> Result<()> {
    let issues = config.validate();
    let errors = issues.iter().filter(|issue| issue.is_error()).count();
    for issue in &issues {
        if issue.is_error() {
            error!("{}", issue.message);
        } else {
            warn!("{}", issue.message);
        }
    }
    if errors > 0 {
        bail!("Invalid configuration ({} errors)", errors);
    }
    Ok(())
}

/// Apply `--participant` to the configured catalog
fn restrict_participants(specs: &mut StaticSpawnSpecs, requested: &[String]) -> Result<()> {
    if requested.is_empty() {
        return Ok(());
    }
    let keep = requested
        .iter()
        .map(|id| ParticipantId::new(id.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(unknown) = keep.iter().find(|id| specs.spawn_spec(id).is_none()) {
        bail!("Unknown participant: {}", unknown);
    }
    specs.retain(&keep);
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting quorum-gateway");

    let config = load_config(&cli)?;
    check_config(&config)?;

    let mut specs = config.spawn_specs();
    restrict_participants(&mut specs, &cli.participant).context("--participant")?;
    let specs: Arc<dyn SpawnSpecProvider> = Arc::new(specs);

    let mut params = config.collaboration_params();
    if cli.no_cross_review {
        params = params.with_cross_review(false);
    }

    // === Dependency Injection ===
    let registry = Arc::new(ClientRegistry::new(
        Arc::clone(&specs),
        Arc::new(ProcessLauncher::new()),
        config.client_options(),
    ));
    let gateway = Arc::new(
        ProcessParticipantGateway::new(registry)
            .with_close_deadline(config.lifecycle.close_all_deadline()),
    );
    let use_case = RunCollaborationUseCase::new(Arc::clone(&gateway), specs).with_params(params);
    let server = Arc::new(
        GatewayServer::new(use_case, Arc::clone(&gateway))
            .with_progress(Arc::new(TracingProgress))
            .with_session_timeout(config.server.session_timeout())
            .with_server_info(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            cancel.cancel();
            // Terminates in-flight calls so the server can drain
            gateway.close_all().await;
        });
    }

    let reader = FrameReader::with_max_line_bytes(tokio::io::stdin(), config.server.max_line_bytes);
    let writer = Arc::new(LineWriter::new(tokio::io::stdout()));
    let reason = server.serve(reader, writer, cancel).await;
    info!("Server stopped: {:?}", reason);

    let summary = gateway.close_all().await;
    if summary.forced > 0 {
        warn!("{} participants had to be killed", summary.forced);
    }
    Ok(())
}
