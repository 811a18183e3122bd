use crate::domain::{StopDetectionConfig, TripAccumulator};
use common::domain::VehicleOwner;
use std::collections::HashMap;

/// Trip accumulators of one connection, keyed by vehicle id.
///
/// Most trackers report a single vehicle per connection; relays that
/// multiplex several get one accumulator per vehicle.
#[derive(Debug, Default)]
pub struct TrackerSessions {
    config: StopDetectionConfig,
    sessions: HashMap<String, TripAccumulator>,
}

impl TrackerSessions {
    pub fn new(config: StopDetectionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    /// Accumulator for a vehicle, created on its first sample
    pub fn session_for(&mut self, owner: &VehicleOwner) -> &mut TripAccumulator {
        let config = self.config;
        self.sessions
            .entry(owner.vehicle_id.clone())
            .or_insert_with(|| {
                TripAccumulator::new(owner.vehicle_id.clone(), owner.user_id.clone(), config)
            })
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&TripAccumulator> {
        self.sessions.get(vehicle_id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TripAccumulator> {
        self.sessions.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
