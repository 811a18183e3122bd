use crate::domain::result::DomainResult;
use crate::domain::Coordinate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Postal address components resolved for a coordinate.
///
/// Every field is an empty string when the component could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    pub house_number: String,
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub county: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl AddressFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One enriched telemetry reading for a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub vehicle_id: String,
    pub user_id: String,
    pub coordinate: Coordinate,
    pub speed: f64,
    pub recorded_at: DateTime<Utc>,
    pub address: AddressFields,
}

/// Input for fetching the most recent position of a vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLatestPositionRepoInput {
    pub vehicle_id: String,
    pub user_id: String,
}

/// Input for listing positions of a vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPositionsByVehicleRepoInput {
    pub vehicle_id: String,
    pub user_id: String,
}

/// Input for listing positions of a user across vehicles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPositionsByUserRepoInput {
    pub user_id: String,
}

/// Repository trait for position storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Persist a single position row
    async fn insert_position(&self, position: &PositionSample) -> DomainResult<()>;

    /// Most recent position by recorded_at
    async fn get_latest_position(
        &self,
        input: GetLatestPositionRepoInput,
    ) -> DomainResult<Option<PositionSample>>;

    /// Positions of one vehicle, oldest first
    async fn list_positions_by_vehicle(
        &self,
        input: ListPositionsByVehicleRepoInput,
    ) -> DomainResult<Vec<PositionSample>>;

    /// Positions of every vehicle owned by a user, oldest first
    async fn list_positions_by_user(
        &self,
        input: ListPositionsByUserRepoInput,
    ) -> DomainResult<Vec<PositionSample>>;
}
