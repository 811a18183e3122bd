use crate::domain::{AuthenticatedPrincipal, VehicleAccess};
use common::domain::{
    DomainError, DomainResult, GetLatestPositionRepoInput, ListPositionsByUserRepoInput,
    ListPositionsByVehicleRepoInput, PositionRepository, PositionSample,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Request for the newest position of a vehicle
#[derive(Debug, Clone, Validate)]
pub struct GetLatestPositionRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
    #[garde(length(min = 1))]
    pub vehicle_id: String,
}

/// Request for every position of one vehicle
#[derive(Debug, Clone, Validate)]
pub struct ListVehiclePositionsRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
    #[garde(length(min = 1))]
    pub vehicle_id: String,
}

/// Request for the positions of every vehicle visible to the principal
#[derive(Debug, Clone, Validate)]
pub struct ListUserPositionsRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
}

/// Read side over stored positions
pub struct PositionQueryService {
    position_repository: Arc<dyn PositionRepository>,
    access: Arc<VehicleAccess>,
}

impl PositionQueryService {
    pub fn new(position_repository: Arc<dyn PositionRepository>, access: Arc<VehicleAccess>) -> Self {
        Self {
            position_repository,
            access,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id(), vehicle_id = %request.vehicle_id))]
    pub async fn latest_position(
        &self,
        request: GetLatestPositionRequest,
    ) -> DomainResult<PositionSample> {
        common::garde::validate_struct(&request)?;
        self.access
            .authorize(&request.principal, &request.vehicle_id)
            .await?;

        self.position_repository
            .get_latest_position(GetLatestPositionRepoInput {
                vehicle_id: request.vehicle_id.clone(),
                user_id: request.principal.user_id().to_string(),
            })
            .await?
            .ok_or(DomainError::PositionNotFound(request.vehicle_id))
    }

    /// Oldest first
    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id(), vehicle_id = %request.vehicle_id))]
    pub async fn positions_for_vehicle(
        &self,
        request: ListVehiclePositionsRequest,
    ) -> DomainResult<Vec<PositionSample>> {
        common::garde::validate_struct(&request)?;
        self.access
            .authorize(&request.principal, &request.vehicle_id)
            .await?;

        let positions = self
            .position_repository
            .list_positions_by_vehicle(ListPositionsByVehicleRepoInput {
                vehicle_id: request.vehicle_id,
                user_id: request.principal.user_id().to_string(),
            })
            .await?;

        debug!(count = positions.len(), "listed vehicle positions");
        Ok(positions)
    }

    /// Oldest first; a vehicle principal only sees its own track
    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id()))]
    pub async fn positions_for_user(
        &self,
        request: ListUserPositionsRequest,
    ) -> DomainResult<Vec<PositionSample>> {
        common::garde::validate_struct(&request)?;

        if let Some(own) = request.principal.vehicle_scope() {
            return self
                .positions_for_vehicle(ListVehiclePositionsRequest {
                    vehicle_id: own.to_string(),
                    principal: request.principal,
                })
                .await;
        }

        let positions = self
            .position_repository
            .list_positions_by_user(ListPositionsByUserRepoInput {
                user_id: request.principal.user_id().to_string(),
            })
            .await?;

        debug!(count = positions.len(), "listed user positions");
        Ok(positions)
    }
}
