mod coordinate;
mod position;
mod result;
mod stop;
mod trip_summary;
mod vehicle;

pub use coordinate::*;
pub use position::*;
pub use result::*;
pub use stop::*;
pub use trip_summary::*;
pub use vehicle::*;
