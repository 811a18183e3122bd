use crate::domain::{AuthenticatedPrincipal, VehicleAccess};
use chrono::NaiveDate;
use common::domain::{DomainResult, ListStopsRepoInput, StopEvent, StopRepository};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Request for the stops of a vehicle, optionally for one UTC day
#[derive(Debug, Clone, Validate)]
pub struct ListStopsRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
    #[garde(length(min = 1))]
    pub vehicle_id: String,
    #[garde(skip)]
    pub date: Option<NaiveDate>,
}

pub struct StopQueryService {
    stop_repository: Arc<dyn StopRepository>,
    access: Arc<VehicleAccess>,
}

impl StopQueryService {
    pub fn new(stop_repository: Arc<dyn StopRepository>, access: Arc<VehicleAccess>) -> Self {
        Self {
            stop_repository,
            access,
        }
    }

    /// Ordered by start time
    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id(), vehicle_id = %request.vehicle_id, date = ?request.date))]
    pub async fn stops_for_vehicle(&self, request: ListStopsRequest) -> DomainResult<Vec<StopEvent>> {
        common::garde::validate_struct(&request)?;
        self.access
            .authorize(&request.principal, &request.vehicle_id)
            .await?;

        let stops = self
            .stop_repository
            .list_stops_by_vehicle(ListStopsRepoInput {
                vehicle_id: request.vehicle_id,
                user_id: request.principal.user_id().to_string(),
                date: request.date,
            })
            .await?;

        debug!(count = stops.len(), "listed stops");
        Ok(stops)
    }
}
