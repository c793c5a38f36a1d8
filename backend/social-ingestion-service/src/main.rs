use actix_web::{dev::ServerHandle, web, App, HttpResponse, HttpServer};
use redis_utils::RedisPool;
use social_ingestion_service::{
    config::{Config, LogFormat},
    jobs::{start_ingestion_loop, IngestionRunner},
    metrics,
    services::{AmqpPublisher, HazardDetector, RedisDedupStore},
    sources::{http_client, BlueskySource, SourceAdapter, TelegramSource},
    IngestionError,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        interval_secs = config.schedule.interval.as_secs(),
        queue = %config.broker.queue,
        "Starting social ingestion service"
    );
    debug!(config = ?config, "Configuration loaded");

    // Dedup cache; dialed on first use so an outage here is not fatal
    let redis = Arc::new(
        RedisPool::open(&config.cache.url)
            .map_err(|e| IngestionError::Cache(format!("{:#}", e)))?,
    );
    let dedup = Arc::new(RedisDedupStore::new(
        redis.clone(),
        config.cache.dedup_ttl,
        config.cache.op_timeout,
    ));
    info!(
        endpoint = redis.endpoint(),
        ttl_secs = dedup.ttl().as_secs(),
        "Dedup store initialized"
    );

    // Broker
    let publisher = match AmqpPublisher::connect(&config.broker.url, config.broker.queue.clone())
        .await
    {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!(error = %e, "Failed to connect to message broker");
            return Err(IngestionError::from(e).into());
        }
    };

    // Sources
    let client = http_client(config.sources.fetch_timeout).map_err(IngestionError::from)?;
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(TelegramSource::new(
            client.clone(),
            config.sources.telegram.clone(),
        )),
        Arc::new(BlueskySource::new(client, config.sources.bluesky.clone())),
    ];

    let detector = HazardDetector::new(&config.hazard_keywords);
    info!(vocabulary = ?detector.vocabulary(), "Hazard detector initialized");

    let runner = Arc::new(IngestionRunner::new(
        sources,
        detector,
        dedup,
        publisher.clone(),
    ));

    // Health and metrics server
    let http_handle = match config.metrics_port {
        Some(port) => Some(start_http_server(port, publisher.clone())?),
        None => None,
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let ingestion = tokio::spawn(start_ingestion_loop(
        runner,
        config.schedule.interval,
        shutdown_tx.subscribe(),
    ));

    shutdown_signal().await;
    info!("Shutdown signal received, waiting for current pass to finish");
    let _ = shutdown_tx.send(());

    if let Err(e) = ingestion.await {
        warn!(error = %e, "Ingestion task ended abnormally");
    }
    if let Some(handle) = http_handle {
        handle.stop(true).await;
    }
    publisher.close().await;

    info!("Social ingestion service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

fn start_http_server(
    port: u16,
    publisher: Arc<AmqpPublisher>,
) -> Result<ServerHandle, IngestionError> {
    let addr = format!("0.0.0.0:{}", port);
    let publisher = web::Data::from(publisher);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(publisher.clone())
            .route("/health", web::get().to(|| async { HttpResponse::Ok().body("OK") }))
            .route("/ready", web::get().to(readiness))
            .route(
                "/metrics",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .content_type("text/plain; version=0.0.4")
                        .body(metrics::render())
                }),
            )
    })
    .workers(1)
    .disable_signals()
    .bind(&addr)?
    .run();

    let handle = server.handle();
    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!(error = %e, "Health server error");
        }
    });

    info!("Health server listening on {}", addr);
    Ok(handle)
}

async fn readiness(publisher: web::Data<AmqpPublisher>) -> HttpResponse {
    if publisher.is_connected().await {
        HttpResponse::Ok().body("READY")
    } else {
        HttpResponse::ServiceUnavailable().body("BROKER DISCONNECTED")
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}
