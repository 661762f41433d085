use common::domain::{InMemoryMessageRepository, MessageRepository};
use common::nats::NatsClient;
use common::postgres::{PostgresClient, PostgresMessageRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use runner::Runner;
use sms_relay::{ServiceConfig, SmsRelay, SmsRelayDependencies, StoreBackend};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&config.telemetry())
    {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        store_backend = ?config.store_backend,
        "Starting sms-relay service"
    );
    debug!(
        nats_url = %config.nats_url,
        postgres = ?config.postgres(),
        worker = ?config.worker(),
        message_service = ?config.message_service(),
        "Configuration loaded"
    );

    let (repository, nats_client) = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialize shared dependencies");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let app = match SmsRelay::new(
        &config,
        SmsRelayDependencies {
            repository,
            consumer: nats_client.create_consumer_client(),
            publisher: nats_client.create_publisher_client(),
        },
    )
    .await
    {
        Ok(app) => app,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialize sms-relay");
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let runner = Runner::new()
        .with_named_process("message_pipeline_worker", app.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs));

    if let Err(e) = runner.run().await {
        eprintln!("sms-relay stopped with error: {e:#}");
        std::process::exit(1);
    }
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<dyn MessageRepository>, NatsClient)> {
    let repository: Arc<dyn MessageRepository> = match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory message store");
            Arc::new(InMemoryMessageRepository::new())
        }
        StoreBackend::Postgres => {
            info!("Initializing PostgreSQL...");
            let client = PostgresClient::from_config(&config.postgres())?;
            let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
            tokio::time::timeout(startup_timeout, client.ping())
                .await
                .map_err(|_| anyhow::anyhow!("PostgreSQL did not answer within {startup_timeout:?}"))??;
            if config.postgres_run_migrations {
                client.run_migrations().await?;
            }
            Arc::new(PostgresMessageRepository::new(client))
        }
    };

    info!("Initializing NATS...");
    let nats_client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;
    nats_client.ensure_stream(&config.nats_message_stream).await?;

    Ok((repository, nats_client))
}
