use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use h264_relay::config::AppConfig;
use h264_relay::ingest::{self, IngestStats};
use h264_relay::media::fanout::MediaPlane;
use h264_relay::state::AppState;
use h264_relay::utils::bind_tcp_listener;
use h264_relay::web;

/// Log verbosity, mirrored after the typical `tracing`-subscriber level set.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// h264-relay command line arguments. Every flag here overrides the matching config file
/// field, applied after the file is loaded (see `config::AppConfig::load`).
#[derive(Parser, Debug)]
#[command(name = "h264-relay")]
#[command(version, about = "UDP H.264 ingest fanned out to WebRTC peers", long_about = None)]
struct CliArgs {
    /// Path to a TOML config file; built-in defaults are used if omitted.
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Signaling HTTP listen address (overrides config).
    #[arg(long, value_name = "ADDRESS")]
    signaling_host: Option<IpAddr>,

    /// Signaling HTTP listen port (overrides config).
    #[arg(long, value_name = "PORT")]
    signaling_port: Option<u16>,

    /// UDP ingest listen address (overrides config).
    #[arg(long, value_name = "ADDRESS")]
    udp_host: Option<IpAddr>,

    /// UDP ingest listen port (overrides config).
    #[arg(long, value_name = "PORT")]
    udp_port: Option<u16>,

    /// RTP payload type (overrides config).
    #[arg(long, value_name = "PT")]
    payload_type: Option<u8>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting h264-relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(args.config.as_deref())?;

    if let Some(host) = args.signaling_host {
        config.signaling.host = host;
    }
    if let Some(port) = args.signaling_port {
        config.signaling.port = port;
    }
    if let Some(host) = args.udp_host {
        config.udp.host = host;
    }
    if let Some(port) = args.udp_port {
        config.udp.port = port;
    }
    if let Some(pt) = args.payload_type {
        config.rtp.payload_type = pt;
    }

    let plane = Arc::new(MediaPlane::new());
    let ingest_stats = Arc::new(IngestStats::new());

    let ingest_plane = plane.clone();
    let ingest_stats_handle = ingest_stats.clone();
    let udp_config = config.udp.clone();
    tokio::spawn(async move {
        if let Err(e) = ingest::udp::run(&udp_config, ingest_plane, ingest_stats_handle).await {
            tracing::error!("UDP ingest task exited: {e}");
        }
    });

    let state = Arc::new(AppState::new(config.clone(), plane.clone(), ingest_stats));
    let router = web::create_router(state);

    let addr = std::net::SocketAddr::new(config.signaling.host, config.signaling.port);
    let std_listener = bind_tcp_listener(addr)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;
    tracing::info!("Signaling server listening on http://{addr}");

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                tracing::error!("signaling server exited: {e}");
            }
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!("closing all sessions");
    plane.close_all().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C (or SIGTERM on Unix), so the process exits cleanly instead of dropping
/// in-flight peer connections mid-close.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "h264_relay=error,tower_http=error",
        LogLevel::Warn => "h264_relay=warn,tower_http=warn",
        LogLevel::Info => "h264_relay=info,tower_http=info",
        LogLevel::Debug => "h264_relay=debug,tower_http=debug",
        LogLevel::Trace => "h264_relay=trace,tower_http=debug",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
