use crate::domain::{GeocodeError, ReverseGeocoder};
use async_trait::async_trait;
use common::domain::{AddressFields, Coordinate};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    /// Nominatim's usage policy rejects anonymous clients
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "fleetrack-gps-tracker".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    house_number: Option<String>,
    road: Option<String>,
    pedestrian: Option<String>,
    footway: Option<String>,
    highway: Option<String>,
    suburb: Option<String>,
    city_district: Option<String>,
    neighbourhood: Option<String>,
    hamlet: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
    error: Option<String>,
}

/// First non-empty candidate, or an empty string
fn first_of(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .copied()
        .flatten()
        .find(|value| !value.is_empty())
        .cloned()
        .unwrap_or_default()
}

fn address_fields(address: NominatimAddress) -> AddressFields {
    AddressFields {
        house_number: address.house_number.unwrap_or_default(),
        street: first_of(&[
            &address.road,
            &address.pedestrian,
            &address.footway,
            &address.highway,
        ]),
        neighborhood: first_of(&[
            &address.suburb,
            &address.city_district,
            &address.neighbourhood,
            &address.hamlet,
        ]),
        city: first_of(&[&address.city, &address.town, &address.village]),
        county: address.county.unwrap_or_default(),
        region: address.state.unwrap_or_default(),
        postal_code: address.postcode.unwrap_or_default(),
        country: address.country.unwrap_or_default(),
    }
}

fn parse_response(body: &[u8]) -> Result<AddressFields, GeocodeError> {
    let response: NominatimResponse =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Decode(e.to_string()))?;
    match (response.address, response.error) {
        (Some(address), _) => Ok(address_fields(address)),
        (None, Some(error)) => Err(GeocodeError::NoMatch(error)),
        (None, None) => Ok(AddressFields::default()),
    }
}

/// Reverse geocoder backed by the OpenStreetMap Nominatim `/reverse` endpoint
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: NominatimConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    #[instrument(skip(self), fields(lat = coordinate.latitude, lon = coordinate.longitude))]
    async fn reverse(&self, coordinate: Coordinate) -> Result<AddressFields, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        let fields = parse_response(&body)?;
        debug!(city = %fields.city, street = %fields.street, "address resolved");
        Ok(fields)
    }
}
