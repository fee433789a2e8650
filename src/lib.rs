pub mod app;
pub mod config;
pub mod engine;
pub mod model;
pub mod session;
pub mod store;
pub mod telemetry;
