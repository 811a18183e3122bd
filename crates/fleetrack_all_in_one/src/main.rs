mod config;

use common::postgres::{
    PostgresClient, PostgresConfig, PostgresPositionRepository, PostgresStopRepository,
    PostgresTripSummaryRepository, PostgresVehicleRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use fleetrack_runner::Runner;
use goose::MigrationRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracker_gateway::geocoding::NominatimGeocoder;
use tracker_gateway::tracker_gateway::{TrackerGateway, TrackerGatewayRepositories};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let gateway_config = match config.tracker_gateway_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {:#}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        tcp_port = config.tcp_port,
        "Starting fleetrack-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let repositories = match initialize_postgres(&config.postgres_config(), config.run_migrations).await
    {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let geocoder = match NominatimGeocoder::new(config.nominatim_config()) {
        Ok(geocoder) => Arc::new(geocoder),
        Err(e) => {
            error!("Failed to build reverse geocoder: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let tracker_gateway = TrackerGateway::new(repositories, geocoder, gateway_config);

    let mut runner = Runner::new();
    for (name, process) in tracker_gateway.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    let result = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;

    if let Err(e) = result {
        eprintln!("fleetrack-all-in-one stopped with error: {:#}", e);
        std::process::exit(1);
    }
}

/// Connects, checks reachability and migrates; any failure here is fatal
async fn initialize_postgres(
    config: &PostgresConfig,
    run_migrations: bool,
) -> anyhow::Result<TrackerGatewayRepositories> {
    info!("Initializing PostgreSQL...");
    let client = PostgresClient::from_config(config)?;
    client.ping().await?;

    if run_migrations {
        MigrationRunner::postgres(
            &config.goose_binary_path,
            &config.migrations_dir,
            &config.dsn(),
        )
        .run_migrations()
        .await?;
    } else {
        debug!("skipping migrations");
    }

    Ok(TrackerGatewayRepositories {
        vehicle: Arc::new(PostgresVehicleRepository::new(client.clone())),
        position: Arc::new(PostgresPositionRepository::new(client.clone())),
        stop: Arc::new(PostgresStopRepository::new(client.clone())),
        trip_summary: Arc::new(PostgresTripSummaryRepository::new(client)),
    })
}
