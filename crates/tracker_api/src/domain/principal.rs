use common::domain::{DomainError, DomainResult, GetVehicleForUserRepoInput, VehicleRepository};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Identity handed over by the authentication layer.
///
/// Every query is scoped to `user_id`; a vehicle principal is further
/// limited to its own vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub enum AuthenticatedPrincipal {
    User {
        #[garde(length(min = 1))]
        user_id: String,
    },
    Vehicle {
        #[garde(length(min = 1))]
        vehicle_id: String,
        #[garde(length(min = 1))]
        user_id: String,
    },
}

impl AuthenticatedPrincipal {
    pub fn user_id(&self) -> &str {
        match self {
            AuthenticatedPrincipal::User { user_id } => user_id,
            AuthenticatedPrincipal::Vehicle { user_id, .. } => user_id,
        }
    }

    /// The only vehicle this principal may read, if it is restricted to one
    pub fn vehicle_scope(&self) -> Option<&str> {
        match self {
            AuthenticatedPrincipal::User { .. } => None,
            AuthenticatedPrincipal::Vehicle { vehicle_id, .. } => Some(vehicle_id),
        }
    }
}

fn not_accessible(principal: &AuthenticatedPrincipal, vehicle_id: &str) -> DomainError {
    DomainError::VehicleNotAccessible(vehicle_id.to_string(), principal.user_id().to_string())
}

/// Ownership gate shared by the query services
pub struct VehicleAccess {
    vehicle_repository: Arc<dyn VehicleRepository>,
}

impl VehicleAccess {
    pub fn new(vehicle_repository: Arc<dyn VehicleRepository>) -> Self {
        Self { vehicle_repository }
    }

    /// Fails with `VehicleNotAccessible` unless the principal may read `vehicle_id`
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn authorize(
        &self,
        principal: &AuthenticatedPrincipal,
        vehicle_id: &str,
    ) -> DomainResult<()> {
        if let Some(own) = principal.vehicle_scope() {
            if own != vehicle_id {
                return Err(not_accessible(principal, vehicle_id));
            }
        }

        let owner = self
            .vehicle_repository
            .get_vehicle_for_user(GetVehicleForUserRepoInput {
                vehicle_id: vehicle_id.to_string(),
                user_id: principal.user_id().to_string(),
            })
            .await?;

        match owner {
            Some(_) => Ok(()),
            None => {
                debug!("vehicle not owned by principal");
                Err(not_accessible(principal, vehicle_id))
            }
        }
    }

    /// Narrow an optional vehicle filter to what the principal may see.
    ///
    /// A vehicle principal always ends up filtered to its own vehicle.
    pub async fn scope_filter(
        &self,
        principal: &AuthenticatedPrincipal,
        vehicle_id: Option<String>,
    ) -> DomainResult<Option<String>> {
        let vehicle_id = match (vehicle_id, principal.vehicle_scope()) {
            (None, Some(own)) => Some(own.to_string()),
            (requested, _) => requested,
        };
        if let Some(vehicle_id) = &vehicle_id {
            self.authorize(principal, vehicle_id).await?;
        }
        Ok(vehicle_id)
    }
}
