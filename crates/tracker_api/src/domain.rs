mod principal;
mod position_query_service;
mod stop_query_service;
mod trip_summary_query_service;

pub use principal::*;
pub use position_query_service::*;
pub use stop_query_service::*;
pub use trip_summary_query_service::*;
