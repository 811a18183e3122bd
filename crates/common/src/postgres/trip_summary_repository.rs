use crate::domain::{
    DomainError, DomainResult, GetLatestTripSummaryRepoInput, ListTripSummariesRepoInput,
    StopSummary, SummaryDateFilter, TripSummary, TripSummaryRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use tracing::{debug, instrument};

/// Trip summary row as stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct TripSummaryRow {
    pub vehicle_id: String,
    pub user_id: String,
    pub summary_date: NaiveDate,
    pub distance_km: f64,
    pub start_time: String,
    pub end_time: String,
    pub total_stops: i32,
    pub total_stop_time: String,
    pub stops: Vec<StopSummary>,
}

impl From<&Row> for TripSummaryRow {
    fn from(row: &Row) -> Self {
        let stops: Json<Vec<StopSummary>> = row.get(8);
        TripSummaryRow {
            vehicle_id: row.get(0),
            user_id: row.get(1),
            summary_date: row.get(2),
            distance_km: row.get(3),
            start_time: row.get(4),
            end_time: row.get(5),
            total_stops: row.get(6),
            total_stop_time: row.get(7),
            stops: stops.0,
        }
    }
}

impl From<TripSummaryRow> for TripSummary {
    fn from(row: TripSummaryRow) -> Self {
        TripSummary {
            vehicle_id: row.vehicle_id,
            user_id: row.user_id,
            date: row.summary_date,
            distance_km: row.distance_km,
            start_time: row.start_time,
            end_time: row.end_time,
            total_stops: row.total_stops,
            total_stop_time: row.total_stop_time,
            stops: row.stops,
        }
    }
}

/// Lower and upper date bounds for a filter; `None` leaves that side open
fn date_bounds(filter: SummaryDateFilter) -> (Option<NaiveDate>, Option<NaiveDate>) {
    match filter {
        SummaryDateFilter::Any => (None, None),
        SummaryDateFilter::On(date) => (Some(date), Some(date)),
        SummaryDateFilter::Between(from, to) => (Some(from), Some(to)),
    }
}

/// PostgreSQL implementation of TripSummaryRepository trait
#[derive(Clone)]
pub struct PostgresTripSummaryRepository {
    client: PostgresClient,
}

impl PostgresTripSummaryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TripSummaryRepository for PostgresTripSummaryRepository {
    #[instrument(skip(self, summary), fields(vehicle_id = %summary.vehicle_id, date = %summary.date))]
    async fn insert_summary(&self, summary: &TripSummary) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO historiques (vehicle_id, user_id, summary_date, distance_km, start_time, end_time,
                                      total_stops, total_stop_time, stops)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &summary.vehicle_id,
                &summary.user_id,
                &summary.date,
                &summary.distance_km,
                &summary.start_time,
                &summary.end_time,
                &summary.total_stops,
                &summary.total_stop_time,
                &Json(&summary.stops),
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(
            distance_km = summary.distance_km,
            total_stops = summary.total_stops,
            "stored trip summary"
        );
        Ok(())
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, vehicle_id = ?input.vehicle_id))]
    async fn list_summaries(
        &self,
        input: ListTripSummariesRepoInput,
    ) -> DomainResult<Vec<TripSummary>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (from, to) = date_bounds(input.date_filter);
        let rows = conn
            .query(
                "SELECT vehicle_id, user_id, summary_date, distance_km, start_time, end_time,
                        total_stops, total_stop_time, stops
                 FROM historiques
                 WHERE user_id = $1
                   AND ($2::text IS NULL OR vehicle_id = $2)
                   AND ($3::date IS NULL OR summary_date >= $3)
                   AND ($4::date IS NULL OR summary_date <= $4)
                 ORDER BY summary_date DESC, id DESC",
                &[&input.user_id, &input.vehicle_id, &from, &to],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| TripSummaryRow::from(row).into())
            .collect())
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, date = %input.date))]
    async fn get_latest_summary(
        &self,
        input: GetLatestTripSummaryRepoInput,
    ) -> DomainResult<Option<TripSummary>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT vehicle_id, user_id, summary_date, distance_km, start_time, end_time,
                        total_stops, total_stop_time, stops
                 FROM historiques
                 WHERE user_id = $1
                   AND ($2::text IS NULL OR vehicle_id = $2)
                   AND summary_date = $3
                 ORDER BY id DESC
                 LIMIT 1",
                &[&input.user_id, &input.vehicle_id, &input.date],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| TripSummaryRow::from(&row).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_bounds() {
        let d1 = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();

        assert_eq!(date_bounds(SummaryDateFilter::Any), (None, None));
        assert_eq!(
            date_bounds(SummaryDateFilter::On(d1)),
            (Some(d1), Some(d1))
        );
        assert_eq!(
            date_bounds(SummaryDateFilter::Between(d1, d2)),
            (Some(d1), Some(d2))
        );
    }
}
