use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Ownership record resolved from a tracker's device identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleOwner {
    pub vehicle_id: String,
    pub user_id: String,
}

/// Input for resolving a device identifier to its vehicle and owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindVehicleByDeviceRepoInput {
    pub device_id: String,
}

/// Input for checking that a vehicle belongs to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetVehicleForUserRepoInput {
    pub vehicle_id: String,
    pub user_id: String,
}

/// Identity lookup over the vehicle registry.
/// Registration and editing of vehicles happen elsewhere; this side only reads.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn find_by_device(
        &self,
        input: FindVehicleByDeviceRepoInput,
    ) -> DomainResult<Option<VehicleOwner>>;

    async fn get_vehicle_for_user(
        &self,
        input: GetVehicleForUserRepoInput,
    ) -> DomainResult<Option<VehicleOwner>>;
}
