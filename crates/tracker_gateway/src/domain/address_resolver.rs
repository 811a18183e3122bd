use crate::domain::ReverseGeocoder;
use chrono::{DateTime, Utc};
use common::domain::{AddressFields, Coordinate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Which vehicles share a cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressCacheScope {
    /// One slot per vehicle
    #[default]
    PerVehicle,
    /// A single slot for the whole process
    Global,
}

#[derive(Debug, Clone)]
pub struct AddressResolverConfig {
    /// Per-axis coordinate delta that invalidates the cached address
    pub threshold_degrees: f64,
    /// Speeds above this always re-resolve
    pub fast_speed: f64,
    /// Maximum age of a cached address
    pub staleness: Duration,
    /// Pause after each geocoder call
    pub courtesy_delay: Duration,
    pub scope: AddressCacheScope,
}

impl Default for AddressResolverConfig {
    fn default() -> Self {
        Self {
            threshold_degrees: 0.0003,
            fast_speed: 10.0,
            staleness: Duration::from_millis(30_000),
            courtesy_delay: Duration::from_millis(1_000),
            scope: AddressCacheScope::PerVehicle,
        }
    }
}

/// Outcome of an address resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressLookup {
    Resolved(AddressFields),
    /// The geocoder failed; every field reads as empty
    Unavailable,
}

impl AddressLookup {
    pub fn fields(&self) -> AddressFields {
        match self {
            AddressLookup::Resolved(fields) => fields.clone(),
            AddressLookup::Unavailable => AddressFields::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, AddressLookup::Resolved(_))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    coordinate: Coordinate,
    cached_at: DateTime<Utc>,
    lookup: AddressLookup,
}

/// Reverse-geocoding behind a spatial, speed and age gated cache.
///
/// The cache lock is never held across the geocoder call, so one slow lookup
/// only stalls the session that issued it.
pub struct AddressResolver {
    geocoder: Arc<dyn ReverseGeocoder>,
    config: AddressResolverConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl AddressResolver {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>, config: AddressResolverConfig) -> Self {
        Self {
            geocoder,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(&self, vehicle_id: &str) -> String {
        match self.config.scope {
            AddressCacheScope::PerVehicle => vehicle_id.to_string(),
            AddressCacheScope::Global => String::new(),
        }
    }

    fn needs_refresh(
        &self,
        entry: &CacheEntry,
        coordinate: Coordinate,
        speed: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let moved = (coordinate.latitude - entry.coordinate.latitude).abs()
            > self.config.threshold_degrees
            || (coordinate.longitude - entry.coordinate.longitude).abs()
                > self.config.threshold_degrees;
        if moved || speed > self.config.fast_speed {
            return true;
        }
        // a clock that went backwards counts as fresh
        let age = (now - entry.cached_at).to_std().unwrap_or(Duration::ZERO);
        age > self.config.staleness
    }

    /// Address for a sample; never fails the caller
    #[instrument(skip(self), fields(vehicle_id = %vehicle_id))]
    pub async fn resolve(
        &self,
        vehicle_id: &str,
        coordinate: Coordinate,
        speed: f64,
        now: DateTime<Utc>,
    ) -> AddressLookup {
        let key = self.cache_key(vehicle_id);

        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&key) {
                if !self.needs_refresh(entry, coordinate, speed, now) {
                    debug!("address cache hit");
                    return entry.lookup.clone();
                }
            }
        }

        let lookup = match self.geocoder.reverse(coordinate).await {
            Ok(fields) => AddressLookup::Resolved(fields),
            Err(e) => {
                warn!(error = %e, "reverse geocoding failed, using empty address");
                AddressLookup::Unavailable
            }
        };

        self.entries.lock().await.insert(
            key,
            CacheEntry {
                coordinate,
                cached_at: now,
                lookup: lookup.clone(),
            },
        );

        if !self.config.courtesy_delay.is_zero() {
            tokio::time::sleep(self.config.courtesy_delay).await;
        }

        lookup
    }
}
