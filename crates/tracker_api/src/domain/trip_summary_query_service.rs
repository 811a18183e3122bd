use crate::domain::{AuthenticatedPrincipal, VehicleAccess};
use chrono::{NaiveDate, NaiveTime};
use common::domain::{
    DomainError, DomainResult, GetLatestTripSummaryRepoInput, ListTripSummariesRepoInput,
    SummaryDateFilter, TripSummary, TripSummaryRepository,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

fn valid_date_filter(filter: &SummaryDateFilter, _ctx: &()) -> garde::Result {
    match filter {
        SummaryDateFilter::Between(from, to) if from > to => {
            Err(garde::Error::new("range start is after range end"))
        }
        _ => Ok(()),
    }
}

/// Request for the historiques visible to the principal
#[derive(Debug, Clone, Validate)]
pub struct ListTripSummariesRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
    #[garde(length(min = 1))]
    pub vehicle_id: Option<String>,
    #[garde(custom(valid_date_filter))]
    pub date_filter: SummaryDateFilter,
}

/// Request for the newest historique of a day, optionally the one covering a clock time
#[derive(Debug, Clone, Validate)]
pub struct TripSummaryOnRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
    #[garde(skip)]
    pub date: NaiveDate,
    #[garde(length(min = 1))]
    pub vehicle_id: Option<String>,
    #[garde(skip)]
    pub at_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Validate)]
pub struct DailyStatsRequest {
    #[garde(dive)]
    pub principal: AuthenticatedPrincipal,
    #[garde(length(min = 1))]
    pub vehicle_id: String,
    #[garde(skip)]
    pub date: NaiveDate,
}

/// Totals over every historique of one vehicle and day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub vehicle_id: String,
    pub date: NaiveDate,
    /// Number of historiques the totals were summed from
    pub trips: usize,
    pub distance_km: f64,
    pub total_stops: i64,
    pub total_stop_seconds: i64,
    /// Same `"{n} min"` form as a single historique
    pub total_stop_time: String,
}

impl DailyStats {
    fn from_summaries(vehicle_id: String, date: NaiveDate, summaries: &[TripSummary]) -> Self {
        let distance_km: f64 = summaries.iter().map(|s| s.distance_km).sum();
        let total_stops = summaries.iter().map(|s| i64::from(s.total_stops)).sum();
        let total_stop_seconds: i64 = summaries
            .iter()
            .flat_map(|s| s.stops.iter())
            .map(|stop| stop.duration_seconds)
            .sum();

        Self {
            vehicle_id,
            date,
            trips: summaries.len(),
            distance_km: (distance_km * 100.0).round() / 100.0,
            total_stops,
            total_stop_seconds,
            total_stop_time: format!("{} min", (total_stop_seconds as f64 / 60.0).round() as i64),
        }
    }
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Whether `at` falls inside the summary's `[start_time, end_time]` window.
///
/// A window whose end is before its start wrapped past midnight.
fn window_contains(summary: &TripSummary, at: NaiveTime) -> bool {
    let (Some(start), Some(end)) = (parse_clock(&summary.start_time), parse_clock(&summary.end_time))
    else {
        return false;
    };
    if start <= end {
        start <= at && at <= end
    } else {
        at >= start || at <= end
    }
}

/// Read side over stored historiques
pub struct TripSummaryQueryService {
    trip_summary_repository: Arc<dyn TripSummaryRepository>,
    access: Arc<VehicleAccess>,
}

impl TripSummaryQueryService {
    pub fn new(
        trip_summary_repository: Arc<dyn TripSummaryRepository>,
        access: Arc<VehicleAccess>,
    ) -> Self {
        Self {
            trip_summary_repository,
            access,
        }
    }

    /// Newest first
    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id(), vehicle_id = ?request.vehicle_id, date_filter = ?request.date_filter))]
    pub async fn trip_summaries(
        &self,
        request: ListTripSummariesRequest,
    ) -> DomainResult<Vec<TripSummary>> {
        common::garde::validate_struct(&request)?;
        let vehicle_id = self
            .access
            .scope_filter(&request.principal, request.vehicle_id)
            .await?;

        let summaries = self
            .trip_summary_repository
            .list_summaries(ListTripSummariesRepoInput {
                user_id: request.principal.user_id().to_string(),
                vehicle_id,
                date_filter: request.date_filter,
            })
            .await?;

        debug!(count = summaries.len(), "listed trip summaries");
        Ok(summaries)
    }

    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id(), date = %request.date, at_time = ?request.at_time))]
    pub async fn trip_summary_on(&self, request: TripSummaryOnRequest) -> DomainResult<TripSummary> {
        common::garde::validate_struct(&request)?;
        let vehicle_id = self
            .access
            .scope_filter(&request.principal, request.vehicle_id)
            .await?;
        let user_id = request.principal.user_id().to_string();
        let not_found = || DomainError::TripSummaryNotFound(format!("{} for {}", request.date, user_id));

        let Some(at) = request.at_time else {
            return self
                .trip_summary_repository
                .get_latest_summary(GetLatestTripSummaryRepoInput {
                    user_id: user_id.clone(),
                    vehicle_id,
                    date: request.date,
                })
                .await?
                .ok_or_else(not_found);
        };

        // listing is newest first, so the first match is the newest covering `at`
        self.trip_summary_repository
            .list_summaries(ListTripSummariesRepoInput {
                user_id: user_id.clone(),
                vehicle_id,
                date_filter: SummaryDateFilter::On(request.date),
            })
            .await?
            .into_iter()
            .find(|summary| window_contains(summary, at))
            .ok_or_else(not_found)
    }

    #[instrument(skip(self, request), fields(user_id = %request.principal.user_id(), vehicle_id = %request.vehicle_id, date = %request.date))]
    pub async fn daily_stats(&self, request: DailyStatsRequest) -> DomainResult<DailyStats> {
        common::garde::validate_struct(&request)?;
        self.access
            .authorize(&request.principal, &request.vehicle_id)
            .await?;

        let summaries = self
            .trip_summary_repository
            .list_summaries(ListTripSummariesRepoInput {
                user_id: request.principal.user_id().to_string(),
                vehicle_id: Some(request.vehicle_id.clone()),
                date_filter: SummaryDateFilter::On(request.date),
            })
            .await?;

        Ok(DailyStats::from_summaries(
            request.vehicle_id,
            request.date,
            &summaries,
        ))
    }
}
