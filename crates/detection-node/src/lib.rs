pub mod alert;
pub mod api;
pub mod capture;
pub mod classify;
pub mod config;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod stream;

pub use config::Config;
pub use state::AppState;
