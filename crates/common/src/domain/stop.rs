use crate::domain::result::DomainResult;
use crate::domain::Coordinate;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A committed dwell of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    pub vehicle_id: String,
    pub user_id: String,
    /// Where the vehicle was when the stop began
    pub coordinate: Coordinate,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub neighborhood: String,
    pub street: String,
}

/// Lightweight stop entry carried inside a trip summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopSummary {
    pub latitude: f64,
    pub longitude: f64,
    pub duration_seconds: i64,
    pub neighborhood: String,
    pub street: String,
}

impl From<&StopEvent> for StopSummary {
    fn from(stop: &StopEvent) -> Self {
        StopSummary {
            latitude: stop.coordinate.latitude,
            longitude: stop.coordinate.longitude,
            duration_seconds: stop.duration_seconds,
            neighborhood: stop.neighborhood.clone(),
            street: stop.street.clone(),
        }
    }
}

/// Input for listing the stops of a vehicle, optionally restricted to one UTC day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListStopsRepoInput {
    pub vehicle_id: String,
    pub user_id: String,
    pub date: Option<NaiveDate>,
}

/// Repository trait for stop storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StopRepository: Send + Sync {
    async fn insert_stop(&self, stop: &StopEvent) -> DomainResult<()>;

    /// Stops ordered by start time
    async fn list_stops_by_vehicle(&self, input: ListStopsRepoInput)
        -> DomainResult<Vec<StopEvent>>;
}
