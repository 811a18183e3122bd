use crate::domain::result::DomainResult;
use crate::domain::StopSummary;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Persisted per-session trip summary ("historique")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub vehicle_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    /// Rounded to two decimals
    pub distance_km: f64,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    pub total_stops: i32,
    /// e.g. `"3 min"`
    pub total_stop_time: String,
    pub stops: Vec<StopSummary>,
}

/// Date restriction applied to summary listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryDateFilter {
    #[default]
    Any,
    On(NaiveDate),
    /// Inclusive on both ends
    Between(NaiveDate, NaiveDate),
}

/// Input for listing trip summaries of a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTripSummariesRepoInput {
    pub user_id: String,
    pub vehicle_id: Option<String>,
    pub date_filter: SummaryDateFilter,
}

/// Input for fetching the newest summary written on a given day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLatestTripSummaryRepoInput {
    pub user_id: String,
    pub vehicle_id: Option<String>,
    pub date: NaiveDate,
}

/// Repository trait for trip summary storage operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TripSummaryRepository: Send + Sync {
    /// Insert a new summary row; rows are never updated in place
    async fn insert_summary(&self, summary: &TripSummary) -> DomainResult<()>;

    /// Summaries newest first (date, then insertion order)
    async fn list_summaries(
        &self,
        input: ListTripSummariesRepoInput,
    ) -> DomainResult<Vec<TripSummary>>;

    async fn get_latest_summary(
        &self,
        input: GetLatestTripSummaryRepoInput,
    ) -> DomainResult<Option<TripSummary>>;
}
