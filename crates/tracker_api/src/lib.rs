pub mod domain;
pub mod tracker_api;
