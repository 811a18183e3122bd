mod client;
mod config;
mod position_repository;
mod stop_repository;
mod trip_summary_repository;
mod vehicle_repository;

pub use client::*;
pub use config::*;
pub use position_repository::*;
pub use stop_repository::*;
pub use trip_summary_repository::*;
pub use vehicle_repository::*;
