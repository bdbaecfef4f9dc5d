mod api;
mod metrics;
mod pipelines;
mod producer;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamvault_core::{
    create_provider, load_config, validate_config, Config, HttpFetcher, MetadataExtractor,
    MetadataStore, PatternTitleParser, ProviderClient, RateLimitedCache, RateLimiter,
    SanitizedConfig, ScrapeMarkers, SqliteStore,
};

use api::create_router;
use pipelines::Pipelines;
use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_FILTER: &str = "streamvault=info,streamvault_core=info,streamvault_server=info";

#[tokio::main]
async fn main() {
    match run().await {
        // A pending stdin read would otherwise hold the runtime open.
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var_os("STREAMVAULT_LOG_JSON").is_some();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// `STREAMVAULT_CONFIG`, then the first argument, then `config.toml`.
fn config_path() -> PathBuf {
    std::env::var("STREAMVAULT_CONFIG")
        .map(PathBuf::from)
        .ok()
        .or_else(|| std::env::args().nth(1).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

async fn run() -> Result<()> {
    init_logging();

    let config_path = config_path();
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config))
        .context("Failed to serialize sanitized config")?;
    info!(version = VERSION, config = %sanitized, "Configuration loaded");

    let store = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to open metadata store")?,
    );
    info!(
        "Metadata store opened at {:?} ({} streams)",
        config.database.path,
        store.count_streams().context("Failed to query metadata store")?
    );

    let extractor = Arc::new(build_extractor(&config)?);
    let markers = Arc::new(ScrapeMarkers::new());
    let pipelines = Arc::new(Pipelines::new(
        store.clone(),
        extractor,
        markers.clone(),
        config.ingest.queue_capacity,
    ));
    pipelines.start().await;

    let providers = init_providers(&config).await;

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        pipelines.clone(),
        providers,
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Serving metrics and health on {}", addr);

    let (server_stop, server_stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = server_stopped.await;
            })
            .await
    });

    let input = open_input(&config).await?;
    let producer_pipelines = pipelines.clone();
    let mut producer =
        tokio::spawn(async move { producer::run(input, &producer_pipelines).await });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            producer.abort();
        }
        result = &mut producer => match result {
            Ok(Ok(_)) => info!("Input exhausted, shutting down"),
            Ok(Err(e)) => error!(error = %e, "Failed to read input"),
            Err(e) => error!(error = %e, "Producer task failed"),
        },
    }

    pipelines.shutdown().await;
    markers.close().await;
    for (pipeline, stats) in pipelines.stats() {
        info!(
            pipeline,
            processed = stats.processed,
            inserted = stats.inserted,
            replaced = stats.replaced,
            skipped = stats.skipped,
            deferred = stats.deferred,
            dropped = stats.dropped,
            failed = stats.failed,
            "Pipeline totals"
        );
    }

    let _ = server_stop.send(());
    match server.await {
        Ok(result) => result.context("Server error")?,
        Err(e) => warn!(error = %e, "Server task ended abnormally"),
    }

    info!("Shutdown complete");
    Ok(())
}

fn build_extractor(config: &Config) -> Result<MetadataExtractor> {
    let fetch = &config.ingest.torrent_fetch;
    let timeout = Duration::from_secs(fetch.timeout_secs);

    let fetcher = HttpFetcher::new(timeout, &config.ingest.user_agent)
        .context("Failed to create HTTP client")?;
    let limiter = Arc::new(RateLimiter::new(
        "torrent_fetch",
        fetch.rate_limit_calls,
        Duration::from_millis(fetch.rate_limit_period_ms),
    ));
    let cache = RateLimitedCache::new(
        "torrent_fetch",
        Duration::from_secs(fetch.ttl_secs),
        timeout,
        limiter,
    );

    Ok(MetadataExtractor::new(
        Arc::new(fetcher),
        cache,
        Arc::new(PatternTitleParser::new()),
    ))
}

/// Build the configured debrid clients. A backend that fails to authenticate
/// is logged and left out.
async fn init_providers(config: &Config) -> Vec<Arc<dyn ProviderClient>> {
    let mut providers = Vec::new();
    for (kind, provider_config) in config.providers.configured() {
        let client = match create_provider(kind, provider_config, &config.ingest.user_agent) {
            Ok(client) => client,
            Err(e) => {
                error!(provider = kind.as_str(), error = %e, "Failed to create provider");
                continue;
            }
        };
        match client.initialize_auth().await {
            Ok(()) => {
                info!(provider = kind.as_str(), "Provider ready");
                providers.push(client);
            }
            Err(e) => warn!(
                provider = kind.as_str(),
                category = %e.category,
                error = %e,
                "Provider authentication failed"
            ),
        }
    }
    providers
}

async fn open_input(config: &Config) -> Result<Box<dyn AsyncBufRead + Send + Unpin>> {
    match &config.ingest.input {
        Some(path) => {
            info!("Reading scraped items from {:?}", path);
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {:?}", path))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading scraped items from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
