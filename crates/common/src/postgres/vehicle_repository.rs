use crate::domain::{
    DomainError, DomainResult, FindVehicleByDeviceRepoInput, GetVehicleForUserRepoInput,
    VehicleOwner, VehicleRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::instrument;

fn owner_from_row(row: &Row) -> VehicleOwner {
    VehicleOwner {
        vehicle_id: row.get(0),
        user_id: row.get(1),
    }
}

/// PostgreSQL implementation of VehicleRepository trait
#[derive(Clone)]
pub struct PostgresVehicleRepository {
    client: PostgresClient,
}

impl PostgresVehicleRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VehicleRepository for PostgresVehicleRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn find_by_device(
        &self,
        input: FindVehicleByDeviceRepoInput,
    ) -> DomainResult<Option<VehicleOwner>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT vehicle_id, user_id FROM vehicles WHERE device_id = $1",
                &[&input.device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(owner_from_row))
    }

    #[instrument(skip(self, input), fields(vehicle_id = %input.vehicle_id, user_id = %input.user_id))]
    async fn get_vehicle_for_user(
        &self,
        input: GetVehicleForUserRepoInput,
    ) -> DomainResult<Option<VehicleOwner>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT vehicle_id, user_id FROM vehicles WHERE vehicle_id = $1 AND user_id = $2",
                &[&input.vehicle_id, &input.user_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(owner_from_row))
    }
}
