use crate::domain::{
    AddressResolver, AddressResolverConfig, HistoriqueFlusher, ReverseGeocoder,
    StopDetectionConfig, TelemetryService,
};
use crate::tcp::{
    run_flush_timer, ConnectionContext, FlushRequest, TelemetryServer, TelemetryServerConfig,
    DEFAULT_FLUSH_INTERVAL,
};
use chrono::{FixedOffset, Offset, Utc};
use common::domain::{PositionRepository, StopRepository, TripSummaryRepository, VehicleRepository};
use fleetrack_runner::{AppProcess, ProcessFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Capacity of the flush broadcast; slow connections coalesce missed ticks
const FLUSH_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct TrackerGatewayConfig {
    pub server: TelemetryServerConfig,
    pub flush_interval: Duration,
    pub stop_detection: StopDetectionConfig,
    pub address: AddressResolverConfig,
    /// Offset used for historique dates and clock times
    pub summary_offset: FixedOffset,
}

impl Default for TrackerGatewayConfig {
    fn default() -> Self {
        Self {
            server: TelemetryServerConfig::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            stop_detection: StopDetectionConfig::default(),
            address: AddressResolverConfig::default(),
            summary_offset: Utc.fix(),
        }
    }
}

pub struct TrackerGatewayRepositories {
    pub vehicle: Arc<dyn VehicleRepository>,
    pub position: Arc<dyn PositionRepository>,
    pub stop: Arc<dyn StopRepository>,
    pub trip_summary: Arc<dyn TripSummaryRepository>,
}

/// Ingestion side of fleetrack: the tracker TCP server plus its flush timer
pub struct TrackerGateway {
    server: TelemetryServer,
    flush_interval: Duration,
    flush_tx: broadcast::Sender<FlushRequest>,
}

impl TrackerGateway {
    pub fn new(
        repositories: TrackerGatewayRepositories,
        geocoder: Arc<dyn ReverseGeocoder>,
        config: TrackerGatewayConfig,
    ) -> Self {
        debug!("Initializing tracker gateway module");

        let address_resolver = Arc::new(AddressResolver::new(geocoder, config.address));
        let telemetry_service = Arc::new(TelemetryService::new(
            repositories.vehicle,
            repositories.position,
            repositories.stop,
            address_resolver,
        ));
        let flusher = Arc::new(HistoriqueFlusher::new(
            repositories.trip_summary,
            config.summary_offset,
        ));

        let context = ConnectionContext {
            telemetry_service,
            flusher,
            stop_detection: config.stop_detection,
            max_frame_bytes: config.server.max_frame_bytes,
            idle_timeout: config.server.idle_timeout,
        };
        let (flush_tx, _) = broadcast::channel(FLUSH_CHANNEL_CAPACITY);
        let server = TelemetryServer::new(config.server, context, flush_tx.clone());

        Self {
            server,
            flush_interval: config.flush_interval,
            flush_tx,
        }
    }

    /// The TCP server and the flush timer as named runner processes
    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let Self {
            server,
            flush_interval,
            flush_tx,
        } = self;

        vec![
            (
                "tracker_server",
                Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                    Box::pin(async move { server.run(ctx).await })
                }),
            ),
            (
                "historique_flush_timer",
                Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                    Box::pin(async move { run_flush_timer(flush_interval, flush_tx, ctx).await })
                }),
            ),
        ]
    }

    /// Serve on `listener` with the flush timer alongside, until `ctx` is cancelled
    pub async fn serve(self, listener: TcpListener, ctx: CancellationToken) -> anyhow::Result<()> {
        let timer = tokio::spawn(run_flush_timer(
            self.flush_interval,
            self.flush_tx,
            ctx.clone(),
        ));
        let served = self.server.serve(listener, ctx.clone()).await;
        ctx.cancel();
        timer.await??;
        served
    }
}
