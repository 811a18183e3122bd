use crate::domain::{
    Coordinate, DomainError, DomainResult, ListStopsRepoInput, StopEvent, StopRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Stop row as stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct StopRow {
    pub vehicle_id: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub neighborhood: String,
    pub street: String,
}

impl From<&Row> for StopRow {
    fn from(row: &Row) -> Self {
        StopRow {
            vehicle_id: row.get(0),
            user_id: row.get(1),
            latitude: row.get(2),
            longitude: row.get(3),
            started_at: row.get(4),
            duration_seconds: row.get(5),
            neighborhood: row.get(6),
            street: row.get(7),
        }
    }
}

impl From<StopRow> for StopEvent {
    fn from(row: StopRow) -> Self {
        StopEvent {
            vehicle_id: row.vehicle_id,
            user_id: row.user_id,
            coordinate: Coordinate {
                latitude: row.latitude,
                longitude: row.longitude,
            },
            started_at: row.started_at,
            duration_seconds: row.duration_seconds,
            neighborhood: row.neighborhood,
            street: row.street,
        }
    }
}

/// PostgreSQL implementation of StopRepository trait
#[derive(Clone)]
pub struct PostgresStopRepository {
    client: PostgresClient,
}

impl PostgresStopRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StopRepository for PostgresStopRepository {
    #[instrument(skip(self, stop), fields(vehicle_id = %stop.vehicle_id, duration_seconds = stop.duration_seconds))]
    async fn insert_stop(&self, stop: &StopEvent) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO stops (vehicle_id, user_id, latitude, longitude, started_at, duration_seconds, neighborhood, street)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &stop.vehicle_id,
                &stop.user_id,
                &stop.coordinate.latitude,
                &stop.coordinate.longitude,
                &stop.started_at,
                &stop.duration_seconds,
                &stop.neighborhood,
                &stop.street,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("stored stop");
        Ok(())
    }

    #[instrument(skip(self, input), fields(vehicle_id = %input.vehicle_id, user_id = %input.user_id))]
    async fn list_stops_by_vehicle(
        &self,
        input: ListStopsRepoInput,
    ) -> DomainResult<Vec<StopEvent>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = match input.date {
            Some(date) => conn
                .query(
                    "SELECT vehicle_id, user_id, latitude, longitude, started_at, duration_seconds, neighborhood, street
                     FROM stops
                     WHERE vehicle_id = $1 AND user_id = $2 AND (started_at AT TIME ZONE 'UTC')::date = $3
                     ORDER BY started_at ASC",
                    &[&input.vehicle_id, &input.user_id, &date],
                )
                .await,
            None => conn
                .query(
                    "SELECT vehicle_id, user_id, latitude, longitude, started_at, duration_seconds, neighborhood, street
                     FROM stops
                     WHERE vehicle_id = $1 AND user_id = $2
                     ORDER BY started_at ASC",
                    &[&input.vehicle_id, &input.user_id],
                )
                .await,
        }
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(|row| StopRow::from(row).into()).collect())
    }
}
