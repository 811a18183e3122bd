use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Vehicle {0} is not accessible to user {1}")]
    VehicleNotAccessible(String, String),

    #[error("Position not found for vehicle: {0}")]
    PositionNotFound(String),

    #[error("Trip summary not found: {0}")]
    TripSummaryNotFound(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid telemetry payload: {0}")]
    InvalidTelemetry(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
