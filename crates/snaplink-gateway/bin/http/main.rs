mod cli;

use crate::cli::{CacheBackendArg, LogFormatArg, StorageBackendArg, CLI};
use anyhow::{bail, Context};
use clap::Parser;
use snaplink_cache::{MokaLinkCache, RedisLinkCache};
use snaplink_core::{LinkCache, Repository};
use snaplink_gateway::{App, AppState};
use snaplink_generator::RandomGenerator;
use snaplink_resolver::ResolverSettings;
use snaplink_shortener::AllocatorSettings;
use snaplink_storage::{InMemoryRepository, MySqlRepository};
use snaplink_telemetry::{LogFormat, TelemetryConfig};
use snaplink_writeback::WritebackPipeline;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PIPELINE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;

    let telemetry = snaplink_telemetry::init(
        TelemetryConfig::builder()
            .service_name("snaplink-gateway")
            .format(match config.log_format {
                LogFormatArg::Text => LogFormat::Text,
                LogFormatArg::Json => LogFormat::Json,
            })
            .otlp_endpoint(config.otlp_endpoint.clone())
            .build(),
    )?;

    if config.stats_ttl_secs <= config.cache_ttl_secs {
        bail!(
            "stats TTL ({}s) must exceed cache TTL ({}s)",
            config.stats_ttl_secs,
            config.cache_ttl_secs
        );
    }

    info!(
        listen_addr = %config.listen_addr,
        base_url = %config.base_url,
        storage_backend = %config.storage,
        cache_backend = %config.cache,
        "starting snaplink gateway"
    );

    let repository = build_repository(&config).await?;
    let cache = build_cache(&config).await?;

    let writeback = WritebackPipeline::new(repository.clone(), cache.clone())
        .spawn()
        .await
        .context("failed to subscribe to cache expirations")?;

    let generator = RandomGenerator::with_length(config.code_length)?;
    let state = AppState::from_backends(
        repository,
        cache,
        generator,
        AllocatorSettings::builder()
            .max_attempts(config.max_attempts)
            .build(),
        ResolverSettings::builder()
            .cache_ttl(Duration::from_secs(config.cache_ttl_secs))
            .stats_ttl(Duration::from_secs(config.stats_ttl_secs))
            .build(),
        config.base_url.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(listen_addr = %listener.local_addr()?, "serving HTTP");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped; draining write-back pipeline");
    if tokio::time::timeout(PIPELINE_SHUTDOWN_TIMEOUT, writeback.shutdown())
        .await
        .is_err()
    {
        warn!("Write-back pipeline did not stop in time");
    }

    telemetry.shutdown();
    Ok(())
}

async fn build_repository(config: &CLI) -> anyhow::Result<Arc<dyn Repository>> {
    match config.storage {
        StorageBackendArg::InMemory => Ok(Arc::new(InMemoryRepository::new())),
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let repository = MySqlRepository::connect(mysql_dsn).await?;
            if config.mysql_init_schema {
                repository.ensure_schema().await?;
            }
            Ok(Arc::new(repository))
        }
    }
}

async fn build_cache(config: &CLI) -> anyhow::Result<Arc<dyn LinkCache>> {
    match config.cache {
        CacheBackendArg::Moka => Ok(Arc::new(MokaLinkCache::new())),
        CacheBackendArg::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .context("redis url is required when cache backend is redis")?;
            let cache = RedisLinkCache::connect(redis_url).await?;
            if config.redis_configure_notifications {
                cache.enable_keyspace_notifications().await?;
            }
            Ok(Arc::new(cache))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
