//! Diligence-RS: multi-source counterparty risk assessment
//!
//! This is the main entry point for the application.

use anyhow::Result;
use diligence_rs::{
    access::AccessLayer,
    cache::ResultCache,
    config,
    limiter::RateLimiter,
    metrics::Metrics,
    network::HttpClient,
    sources::SourceLoader,
    web::{create_router, AppState},
    Assessor,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => anyhow::bail!("{} needs a file argument", arg),
            },
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "-V" | "--version" => {
                println!("diligence-rs {}", diligence_rs::VERSION);
                return Ok(());
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }

    // Load configuration
    let settings = config::load_from(config_path.as_deref())?;

    // Initialize logging, RUST_LOG wins over the configured level
    let level = if settings.general.debug {
        "debug"
    } else {
        settings.general.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting Diligence-RS v{}", diligence_rs::VERSION);
    info!("Loaded configuration for instance: {}", settings.general.instance_name);

    // Initialize HTTP client
    let client = HttpClient::with_settings(&settings.outgoing)?;
    info!("HTTP client initialized");

    // Load collaborators
    let registry = SourceLoader::load(&settings, &client)?;
    info!("Loaded {} sources: {}", registry.len(), registry.names().join(", "));

    // Access layer in front of them
    let limiter = RateLimiter::with_limits(SourceLoader::rate_limits(&settings));
    let cache = ResultCache::new(settings.cache.max_entries);
    let access = AccessLayer::new(Arc::new(cache), Arc::new(limiter))
        .with_retry(settings.assessment.retry)
        .with_metrics(Arc::new(Metrics::new()));

    let assessor = Assessor::new(
        Arc::new(registry),
        Arc::new(access),
        settings.assessment.clone(),
    );

    // Create router
    let state = AppState::new(settings.clone(), assessor);
    let app = create_router(state);

    // Bind address
    let addr = SocketAddr::new(
        settings.server.bind_address.parse()?,
        settings.server.port,
    );

    info!("Starting server on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Print usage information
fn print_usage() {
    println!(
        r#"
Diligence-RS v{}
Multi-source counterparty risk assessment

USAGE:
    diligence-rs [OPTIONS]

OPTIONS:
    -c, --config <FILE>    Path to configuration file
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    DILIGENCE_SETTINGS_PATH   Path to settings.yml
    DILIGENCE_PORT            Server port
    DILIGENCE_BIND_ADDRESS    Bind address
    DILIGENCE_LOG_LEVEL       Log level (info, debug, ...)
    DILIGENCE_DEBUG           Enable debug logging (true/false)
    RUST_LOG                  Log filter, overrides general.log_level
"#,
        diligence_rs::VERSION
    );
}
