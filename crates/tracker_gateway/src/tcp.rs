mod connection;
mod flush_timer;
mod frame_codec;
mod payload;
mod server;

pub use connection::*;
pub use flush_timer::*;
pub use frame_codec::*;
pub use payload::*;
pub use server::*;
