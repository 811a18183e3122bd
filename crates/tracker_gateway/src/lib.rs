pub mod domain;
pub mod geocoding;
pub mod tcp;
pub mod tracker_gateway;
