pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod integrity;
pub mod models;
pub mod server;
pub mod service;
pub mod store;
pub mod validation;
pub mod workflow;
