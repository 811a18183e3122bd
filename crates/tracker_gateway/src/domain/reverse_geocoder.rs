use async_trait::async_trait;
use common::domain::{AddressFields, Coordinate};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Transport(String),

    #[error("geocoder responded with status {0}")]
    Status(u16),

    #[error("geocoder response could not be decoded: {0}")]
    Decode(String),

    #[error("no address for coordinate: {0}")]
    NoMatch(String),
}

/// Best-effort coordinate to postal address lookup
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coordinate: Coordinate) -> Result<AddressFields, GeocodeError>;
}
