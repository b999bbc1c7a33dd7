pub mod config;
pub mod logging;

pub use config::{Environment, LogLevel};
pub use logging::setup_logging;
