//! Client Portal Server Library
//!
//! Exports the modules behind the server binary so request-level tests and
//! tools can build the same application.

pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod security;
pub mod services;
pub mod utils;
pub mod views;

// Re-export commonly used types for convenience
pub use config::AppSettings;
pub use error::AppError;
pub use models::AppState;
