use crate::domain::distance_meters;
use chrono::{DateTime, Utc};
use common::domain::{Coordinate, PositionSample, StopEvent, StopSummary};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopDetectionConfig {
    /// Samples at or below this speed count as stationary
    pub stop_speed_threshold: f64,
    /// Shorter dwells are discarded
    pub min_stop_seconds: i64,
}

impl Default for StopDetectionConfig {
    fn default() -> Self {
        Self {
            stop_speed_threshold: 2.0,
            min_stop_seconds: 10,
        }
    }
}

/// An open dwell, anchored at the first stationary sample
#[derive(Debug, Clone, PartialEq)]
pub struct StopCandidate {
    pub since: DateTime<Utc>,
    /// Time of the latest stationary sample
    pub last_seen: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub neighborhood: String,
    pub street: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum MotionState {
    #[default]
    Idle,
    Moving,
    Stopped(StopCandidate),
}

/// Per-vehicle trip state for one reporting session.
///
/// Owned by exactly one connection task; samples must be fed in arrival order.
#[derive(Debug, Clone)]
pub struct TripAccumulator {
    vehicle_id: String,
    user_id: String,
    config: StopDetectionConfig,
    state: MotionState,
    sample_count: usize,
    start_time: Option<DateTime<Utc>>,
    last_coordinate: Option<Coordinate>,
    total_distance_meters: f64,
    total_stop_seconds: f64,
    closed_stops: Vec<StopSummary>,
}

impl TripAccumulator {
    pub fn new(vehicle_id: String, user_id: String, config: StopDetectionConfig) -> Self {
        Self {
            vehicle_id,
            user_id,
            config,
            state: MotionState::Idle,
            sample_count: 0,
            start_time: None,
            last_coordinate: None,
            total_distance_meters: 0.0,
            total_stop_seconds: 0.0,
            closed_stops: Vec::new(),
        }
    }

    /// Advance the state machine; returns a stop when a long enough dwell closes
    pub fn update(&mut self, sample: &PositionSample) -> Option<StopEvent> {
        if let Some(previous) = self.last_coordinate {
            self.total_distance_meters += distance_meters(previous, sample.coordinate);
        }
        if self.start_time.is_none() {
            self.start_time = Some(sample.recorded_at);
        }
        self.last_coordinate = Some(sample.coordinate);
        self.sample_count += 1;

        let stationary = sample.speed <= self.config.stop_speed_threshold;
        match std::mem::take(&mut self.state) {
            MotionState::Stopped(mut candidate) if stationary => {
                candidate.last_seen = sample.recorded_at;
                self.state = MotionState::Stopped(candidate);
                None
            }
            MotionState::Stopped(candidate) => {
                self.state = MotionState::Moving;
                self.close_stop(candidate)
            }
            _ if stationary => {
                self.state = MotionState::Stopped(StopCandidate {
                    since: sample.recorded_at,
                    last_seen: sample.recorded_at,
                    coordinate: sample.coordinate,
                    neighborhood: sample.address.neighborhood.clone(),
                    street: sample.address.street.clone(),
                });
                None
            }
            _ => {
                self.state = MotionState::Moving;
                None
            }
        }
    }

    fn close_stop(&mut self, candidate: StopCandidate) -> Option<StopEvent> {
        let duration = (candidate.last_seen - candidate.since).num_milliseconds() as f64 / 1000.0;
        if duration < self.config.min_stop_seconds as f64 {
            debug!(
                vehicle_id = %self.vehicle_id,
                duration_seconds = duration,
                "dwell too short, discarded"
            );
            return None;
        }

        self.total_stop_seconds += duration;
        let stop = StopEvent {
            vehicle_id: self.vehicle_id.clone(),
            user_id: self.user_id.clone(),
            coordinate: candidate.coordinate,
            started_at: candidate.since,
            duration_seconds: duration.round() as i64,
            neighborhood: candidate.neighborhood,
            street: candidate.street,
        };
        self.closed_stops.push(StopSummary::from(&stop));
        Some(stop)
    }

    /// Back to the empty state; identity and thresholds are kept
    pub fn reset(&mut self) {
        *self = Self::new(
            std::mem::take(&mut self.vehicle_id),
            std::mem::take(&mut self.user_id),
            self.config,
        );
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn total_distance_meters(&self) -> f64 {
        self.total_distance_meters
    }

    pub fn total_stop_seconds(&self) -> f64 {
        self.total_stop_seconds
    }

    pub fn closed_stops(&self) -> &[StopSummary] {
        &self.closed_stops
    }
}
