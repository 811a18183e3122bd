use crate::domain::{TrackerSessions, TripAccumulator};
use chrono::{DateTime, FixedOffset, Utc};
use common::domain::{DomainResult, TripSummary, TripSummaryRepository};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// A session needs two samples before it has a distance or a duration
pub const MIN_SAMPLES_FOR_SUMMARY: usize = 2;

/// Round to two decimals
fn round_km(meters: f64) -> f64 {
    (meters / 1000.0 * 100.0).round() / 100.0
}

/// `"{minutes} min"`, minutes rounded to nearest
pub fn format_stop_time(seconds: f64) -> String {
    format!("{} min", (seconds / 60.0).round() as i64)
}

/// Summary of an accumulator as of `now`, or `None` below the sample guard
pub fn build_trip_summary(
    accumulator: &TripAccumulator,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<TripSummary> {
    if accumulator.sample_count() < MIN_SAMPLES_FOR_SUMMARY {
        return None;
    }
    let start = accumulator.start_time()?.with_timezone(&offset);
    let end = now.with_timezone(&offset);

    Some(TripSummary {
        vehicle_id: accumulator.vehicle_id().to_string(),
        user_id: accumulator.user_id().to_string(),
        date: end.date_naive(),
        distance_km: round_km(accumulator.total_distance_meters()),
        start_time: start.format("%H:%M").to_string(),
        end_time: end.format("%H:%M").to_string(),
        total_stops: accumulator.closed_stops().len() as i32,
        total_stop_time: format_stop_time(accumulator.total_stop_seconds()),
        stops: accumulator.closed_stops().to_vec(),
    })
}

/// Persists historiques and resets the accumulators they were built from
pub struct HistoriqueFlusher {
    trip_summary_repository: Arc<dyn TripSummaryRepository>,
    offset: FixedOffset,
}

impl HistoriqueFlusher {
    pub fn new(trip_summary_repository: Arc<dyn TripSummaryRepository>, offset: FixedOffset) -> Self {
        Self {
            trip_summary_repository,
            offset,
        }
    }

    /// Write one summary and reset the accumulator.
    ///
    /// Below the sample guard this is a silent no-op. When the insert fails the
    /// accumulator is left untouched so the next flush retries with more data.
    #[instrument(skip(self, accumulator, now), fields(vehicle_id = %accumulator.vehicle_id()))]
    pub async fn flush(
        &self,
        accumulator: &mut TripAccumulator,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<TripSummary>> {
        let Some(summary) = build_trip_summary(accumulator, now, self.offset) else {
            debug!(samples = accumulator.sample_count(), "nothing to flush");
            return Ok(None);
        };

        self.trip_summary_repository.insert_summary(&summary).await?;
        accumulator.reset();

        info!(
            distance_km = summary.distance_km,
            total_stops = summary.total_stops,
            total_stop_time = %summary.total_stop_time,
            "historique saved"
        );
        Ok(Some(summary))
    }

    /// Flush every session of a connection; failures are logged per vehicle
    pub async fn flush_sessions(&self, sessions: &mut TrackerSessions, now: DateTime<Utc>) -> usize {
        let mut written = 0;
        for accumulator in sessions.iter_mut() {
            match self.flush(accumulator, now).await {
                Ok(Some(_)) => written += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(
                        vehicle_id = %accumulator.vehicle_id(),
                        error = %e,
                        "failed to save historique, keeping session state"
                    );
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StopDetectionConfig;
    use chrono::TimeZone;
    use common::domain::{
        AddressFields, Coordinate, DomainError, MockTripSummaryRepository, PositionSample,
        VehicleOwner,
    };

    fn sample(seconds: i64, latitude: f64, speed: f64) -> PositionSample {
        PositionSample {
            vehicle_id: "truck-01".to_string(),
            user_id: "user-001".to_string(),
            coordinate: Coordinate::new(latitude, 0.0).unwrap(),
            speed,
            recorded_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
                + chrono::Duration::seconds(seconds),
            address: AddressFields::default(),
        }
    }

    fn accumulator() -> TripAccumulator {
        TripAccumulator::new(
            "truck-01".to_string(),
            "user-001".to_string(),
            StopDetectionConfig::default(),
        )
    }

    fn flush_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 5, 0).unwrap()
    }

    #[tokio::test]
    async fn test_single_sample_is_not_flushed() {
        let mut repo = MockTripSummaryRepository::new();
        repo.expect_insert_summary().times(0);
        let flusher = HistoriqueFlusher::new(Arc::new(repo), FixedOffset::east_opt(0).unwrap());

        let mut acc = accumulator();
        acc.update(&sample(0, 0.0, 0.0));

        let result = flusher.flush(&mut acc, flush_time()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(acc.sample_count(), 1);
    }

    #[tokio::test]
    async fn test_flush_writes_summary_and_resets() {
        let mut repo = MockTripSummaryRepository::new();
        repo.expect_insert_summary()
            .withf(|summary| {
                summary.vehicle_id == "truck-01"
                    && summary.total_stops == 1
                    && summary.distance_km == 0.11
                    && summary.start_time == "08:00"
                    && summary.end_time == "08:05"
                    && summary.total_stop_time == "0 min"
                    && summary.stops.len() == 1
                    && summary.stops[0].duration_seconds == 12
            })
            .times(1)
            .returning(|_| Ok(()));
        let flusher = HistoriqueFlusher::new(Arc::new(repo), FixedOffset::east_opt(0).unwrap());

        let mut acc = accumulator();
        acc.update(&sample(0, 0.0, 0.0));
        acc.update(&sample(12, 0.0, 0.0));
        acc.update(&sample(30, 0.001, 20.0));

        let summary = flusher.flush(&mut acc, flush_time()).await.unwrap().unwrap();
        assert_eq!(summary.date, chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(acc.sample_count(), 0);
        assert_eq!(acc.total_distance_meters(), 0.0);
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_state() {
        let mut repo = MockTripSummaryRepository::new();
        repo.expect_insert_summary()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("db down"))));
        let flusher = HistoriqueFlusher::new(Arc::new(repo), FixedOffset::east_opt(0).unwrap());

        let mut acc = accumulator();
        acc.update(&sample(0, 0.0, 30.0));
        acc.update(&sample(10, 0.001, 30.0));

        assert!(flusher.flush(&mut acc, flush_time()).await.is_err());
        assert_eq!(acc.sample_count(), 2);
        assert!(acc.total_distance_meters() > 100.0);
    }

    #[tokio::test]
    async fn test_offset_shifts_date_and_clock() {
        let mut repo = MockTripSummaryRepository::new();
        repo.expect_insert_summary()
            .withf(|summary| {
                summary.start_time == "01:30"
                    && summary.end_time == "01:35"
                    && summary.date == chrono::NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
            })
            .times(1)
            .returning(|_| Ok(()));
        // UTC+2 pushes 23:30 into the next day
        let flusher =
            HistoriqueFlusher::new(Arc::new(repo), FixedOffset::east_opt(2 * 3600).unwrap());

        let start = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
        let mut acc = accumulator();
        for (i, lat) in [0.0, 0.001].into_iter().enumerate() {
            acc.update(&PositionSample {
                recorded_at: start + chrono::Duration::seconds(i as i64 * 60),
                ..sample(0, lat, 30.0)
            });
        }

        flusher
            .flush(&mut acc, start + chrono::Duration::minutes(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_flush_sessions_counts_written_summaries() {
        let mut repo = MockTripSummaryRepository::new();
        repo.expect_insert_summary().times(1).returning(|_| Ok(()));
        let flusher = HistoriqueFlusher::new(Arc::new(repo), FixedOffset::east_opt(0).unwrap());

        let mut sessions = TrackerSessions::new(StopDetectionConfig::default());
        let busy = VehicleOwner {
            vehicle_id: "truck-01".to_string(),
            user_id: "user-001".to_string(),
        };
        let quiet = VehicleOwner {
            vehicle_id: "truck-02".to_string(),
            user_id: "user-001".to_string(),
        };
        sessions.session_for(&busy).update(&sample(0, 0.0, 30.0));
        sessions.session_for(&busy).update(&sample(10, 0.001, 30.0));
        sessions.session_for(&quiet).update(&sample(0, 0.0, 30.0));

        assert_eq!(flusher.flush_sessions(&mut sessions, flush_time()).await, 1);
    }

    #[test]
    fn test_stop_time_format_rounds_minutes() {
        assert_eq!(format_stop_time(0.0), "0 min");
        assert_eq!(format_stop_time(89.0), "1 min");
        assert_eq!(format_stop_time(90.0), "2 min");
        assert_eq!(format_stop_time(3600.0), "60 min");
    }

    #[test]
    fn test_distance_rounding() {
        assert_eq!(round_km(111.19), 0.11);
        assert_eq!(round_km(12_346.0), 12.35);
        assert_eq!(round_km(0.0), 0.0);
    }
}
