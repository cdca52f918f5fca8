pub mod api;
pub mod app;
pub mod config;
pub mod config_io;
pub mod engine;
pub mod logging;
pub mod session;
