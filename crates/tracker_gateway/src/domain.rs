mod address_resolver;
mod geo_distance;
mod historique_flusher;
mod reverse_geocoder;
mod telemetry_service;
mod tracker_sessions;
mod trip_accumulator;

pub use address_resolver::*;
pub use geo_distance::*;
pub use historique_flusher::*;
pub use reverse_geocoder::*;
pub use telemetry_service::*;
pub use tracker_sessions::*;
pub use trip_accumulator::*;
