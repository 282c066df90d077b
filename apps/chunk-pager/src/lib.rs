pub mod client;
pub mod config;
pub mod source;
pub mod telemetry;
