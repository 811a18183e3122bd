use crate::domain::{
    AddressFields, Coordinate, DomainError, DomainResult, GetLatestPositionRepoInput,
    ListPositionsByUserRepoInput, ListPositionsByVehicleRepoInput, PositionRepository,
    PositionSample,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const POSITION_COLUMNS: &str = "vehicle_id, user_id, latitude, longitude, speed, recorded_at, \
     house_number, street, neighborhood, city, county, region, postal_code, country";

/// Position row as stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct PositionRow {
    pub vehicle_id: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub recorded_at: DateTime<Utc>,
    pub house_number: String,
    pub street: String,
    pub neighborhood: String,
    pub city: String,
    pub county: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl From<&Row> for PositionRow {
    fn from(row: &Row) -> Self {
        PositionRow {
            vehicle_id: row.get(0),
            user_id: row.get(1),
            latitude: row.get(2),
            longitude: row.get(3),
            speed: row.get(4),
            recorded_at: row.get(5),
            house_number: row.get(6),
            street: row.get(7),
            neighborhood: row.get(8),
            city: row.get(9),
            county: row.get(10),
            region: row.get(11),
            postal_code: row.get(12),
            country: row.get(13),
        }
    }
}

/// Rows were range-checked on the way in, so the coordinate is rebuilt as-is
impl From<PositionRow> for PositionSample {
    fn from(row: PositionRow) -> Self {
        PositionSample {
            vehicle_id: row.vehicle_id,
            user_id: row.user_id,
            coordinate: Coordinate {
                latitude: row.latitude,
                longitude: row.longitude,
            },
            speed: row.speed,
            recorded_at: row.recorded_at,
            address: AddressFields {
                house_number: row.house_number,
                street: row.street,
                neighborhood: row.neighborhood,
                city: row.city,
                county: row.county,
                region: row.region,
                postal_code: row.postal_code,
                country: row.country,
            },
        }
    }
}

/// PostgreSQL implementation of PositionRepository trait
#[derive(Clone)]
pub struct PostgresPositionRepository {
    client: PostgresClient,
}

impl PostgresPositionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PositionRepository for PostgresPositionRepository {
    #[instrument(skip(self, position), fields(vehicle_id = %position.vehicle_id, user_id = %position.user_id))]
    async fn insert_position(&self, position: &PositionSample) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let address = &position.address;
        conn.execute(
            "INSERT INTO positions (vehicle_id, user_id, latitude, longitude, speed, recorded_at,
                                    house_number, street, neighborhood, city, county, region, postal_code, country)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            &[
                &position.vehicle_id,
                &position.user_id,
                &position.coordinate.latitude,
                &position.coordinate.longitude,
                &position.speed,
                &position.recorded_at,
                &address.house_number,
                &address.street,
                &address.neighborhood,
                &address.city,
                &address.county,
                &address.region,
                &address.postal_code,
                &address.country,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("stored position");
        Ok(())
    }

    #[instrument(skip(self, input), fields(vehicle_id = %input.vehicle_id, user_id = %input.user_id))]
    async fn get_latest_position(
        &self,
        input: GetLatestPositionRepoInput,
    ) -> DomainResult<Option<PositionSample>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM positions
             WHERE vehicle_id = $1 AND user_id = $2
             ORDER BY recorded_at DESC, id DESC
             LIMIT 1",
            POSITION_COLUMNS
        );
        let row = conn
            .query_opt(&query, &[&input.vehicle_id, &input.user_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| PositionRow::from(&row).into()))
    }

    #[instrument(skip(self, input), fields(vehicle_id = %input.vehicle_id, user_id = %input.user_id))]
    async fn list_positions_by_vehicle(
        &self,
        input: ListPositionsByVehicleRepoInput,
    ) -> DomainResult<Vec<PositionSample>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM positions
             WHERE vehicle_id = $1 AND user_id = $2
             ORDER BY recorded_at ASC, id ASC",
            POSITION_COLUMNS
        );
        let rows = conn
            .query(&query, &[&input.vehicle_id, &input.user_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| PositionRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn list_positions_by_user(
        &self,
        input: ListPositionsByUserRepoInput,
    ) -> DomainResult<Vec<PositionSample>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM positions
             WHERE user_id = $1
             ORDER BY recorded_at ASC, id ASC",
            POSITION_COLUMNS
        );
        let rows = conn
            .query(&query, &[&input.user_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| PositionRow::from(row).into())
            .collect())
    }
}
