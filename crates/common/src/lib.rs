pub mod alerts;
pub mod cameras;
pub mod contracts;
pub mod error;
pub mod frames;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
