//! The gateway server binary.
//!
//! Loads configuration (file, then environment, then flags), initializes
//! tracing to stderr, probes the ASR upstream when asked to, and serves the
//! REST + WebSocket surface.
//!
//! Exit codes: 0 on clean shutdown, 1 on configuration errors, 2 when the
//! upstream is unreachable at startup.

use clap::Parser;
use mondstuk::server::{GatewayState, app};
use mondstuk::{GatewayConfig, GatewayError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Real-time dictation gateway for Dutch dental practices.
#[derive(Parser, Debug)]
#[command(name = "mondstuk-server", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the default configuration to the given path and exit.
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the upstream ASR endpoint.
    #[arg(long)]
    asr_url: Option<String>,

    /// Override the lexicon data directory.
    #[arg(long)]
    lexicon_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Some(path) = &args.init_config {
        return match GatewayConfig::default().save_to_file(path) {
            Ok(_) => {
                info!("default configuration written to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("could not write configuration: {e}");
                ExitCode::from(1)
            }
        };
    }

    let mut config = match &args.config {
        Some(path) => match GatewayConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("configuration error: {e}");
                return ExitCode::from(1);
            }
        },
        None => GatewayConfig::default(),
    };
    config.apply_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.asr_url {
        config.asr.endpoint = url;
    }
    if let Some(dir) = args.lexicon_dir {
        config.lexicon.data_dir = dir;
    }

    let probe_upstream = config.asr.probe_on_startup;
    let state = match GatewayState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            error!("startup error: {e}");
            return ExitCode::from(1);
        }
    };

    if probe_upstream {
        let asr = match mondstuk::asr::HttpAsr::new(
            &state.config.asr.endpoint,
            state.config.asr.api_key.clone(),
            &state.config.asr.model,
            std::time::Duration::from_secs(10),
        ) {
            Ok(asr) => asr,
            Err(e) => {
                error!("startup error: {e}");
                return ExitCode::from(1);
            }
        };
        if let Err(e) = asr.probe().await {
            error!("ASR upstream unreachable: {e}");
            return ExitCode::from(2);
        }
        info!("ASR upstream reachable");
    }

    let sweeper = state.spawn_sweeper();
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot bind {addr}: {e}");
            return ExitCode::from(1);
        }
    };
    info!("mondstuk-server listening on {addr}");

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();

    match served.map_err(GatewayError::Io) {
        Ok(()) => {
            info!("mondstuk-server shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("could not install ctrl-c handler");
    }
}
