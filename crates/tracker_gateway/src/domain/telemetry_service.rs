use crate::domain::{AddressResolver, TrackerSessions};
use chrono::{DateTime, Utc};
use common::domain::{
    Coordinate, DomainResult, FindVehicleByDeviceRepoInput, PositionRepository, PositionSample,
    StopEvent, StopRepository, VehicleRepository,
};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// A validated telemetry message, before identity resolution
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub device_id: String,
    pub coordinate: Coordinate,
    /// Never negative
    pub speed: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Position persisted; carries the stop the sample closed, if any
    Stored {
        position: PositionSample,
        stop: Option<StopEvent>,
    },
    /// No vehicle is registered for the device
    UnknownDevice,
}

/// Per-message ingestion: identity, address, trip state, persistence
pub struct TelemetryService {
    vehicle_repository: Arc<dyn VehicleRepository>,
    position_repository: Arc<dyn PositionRepository>,
    stop_repository: Arc<dyn StopRepository>,
    address_resolver: Arc<AddressResolver>,
}

impl TelemetryService {
    pub fn new(
        vehicle_repository: Arc<dyn VehicleRepository>,
        position_repository: Arc<dyn PositionRepository>,
        stop_repository: Arc<dyn StopRepository>,
        address_resolver: Arc<AddressResolver>,
    ) -> Self {
        Self {
            vehicle_repository,
            position_repository,
            stop_repository,
            address_resolver,
        }
    }

    /// Process one reading against the connection's sessions.
    ///
    /// The accumulator is advanced before the position is written; a failed
    /// write is returned as an error but the sample still counts toward the trip.
    #[instrument(skip(self, reading, sessions, now), fields(device_id = %reading.device_id))]
    pub async fn ingest(
        &self,
        reading: TelemetryReading,
        sessions: &mut TrackerSessions,
        now: DateTime<Utc>,
    ) -> DomainResult<IngestOutcome> {
        let owner = match self
            .vehicle_repository
            .find_by_device(FindVehicleByDeviceRepoInput {
                device_id: reading.device_id.clone(),
            })
            .await?
        {
            Some(owner) => owner,
            None => {
                warn!(device_id = %reading.device_id, "no vehicle registered for device");
                return Ok(IngestOutcome::UnknownDevice);
            }
        };

        let lookup = self
            .address_resolver
            .resolve(&owner.vehicle_id, reading.coordinate, reading.speed, now)
            .await;

        let position = PositionSample {
            vehicle_id: owner.vehicle_id.clone(),
            user_id: owner.user_id.clone(),
            coordinate: reading.coordinate,
            speed: reading.speed,
            recorded_at: reading.recorded_at,
            address: lookup.fields(),
        };

        let stop = sessions.session_for(&owner).update(&position);
        if let Some(stop) = &stop {
            if let Err(e) = self.stop_repository.insert_stop(stop).await {
                error!(
                    vehicle_id = %stop.vehicle_id,
                    error = %e,
                    "failed to persist stop"
                );
            }
        }

        self.position_repository.insert_position(&position).await?;

        debug!(
            vehicle_id = %position.vehicle_id,
            neighborhood = %position.address.neighborhood,
            street = %position.address.street,
            "position stored"
        );
        Ok(IngestOutcome::Stored { position, stop })
    }
}
