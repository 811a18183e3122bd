use crate::domain::{
    PositionQueryService, StopQueryService, TripSummaryQueryService, VehicleAccess,
};
use common::domain::{PositionRepository, StopRepository, TripSummaryRepository, VehicleRepository};
use std::sync::Arc;
use tracing::debug;

pub struct TrackerApiRepositories {
    pub vehicle: Arc<dyn VehicleRepository>,
    pub position: Arc<dyn PositionRepository>,
    pub stop: Arc<dyn StopRepository>,
    pub trip_summary: Arc<dyn TripSummaryRepository>,
}

/// Read-only facade handed to the HTTP layer.
///
/// Every operation takes the principal the authentication layer produced and
/// never returns data outside that principal's user scope.
#[derive(Clone)]
pub struct TrackerApi {
    pub positions: Arc<PositionQueryService>,
    pub trip_summaries: Arc<TripSummaryQueryService>,
    pub stops: Arc<StopQueryService>,
}

impl TrackerApi {
    pub fn new(repositories: TrackerApiRepositories) -> Self {
        debug!("Initializing tracker API module");
        let access = Arc::new(VehicleAccess::new(repositories.vehicle));
        Self {
            positions: Arc::new(PositionQueryService::new(
                repositories.position,
                access.clone(),
            )),
            trip_summaries: Arc::new(TripSummaryQueryService::new(
                repositories.trip_summary,
                access.clone(),
            )),
            stops: Arc::new(StopQueryService::new(repositories.stop, access)),
        }
    }
}
