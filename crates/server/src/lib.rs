//! HTTP service for logvault.
//!
//! This crate provides:
//! - Window retrieval streaming decoded archives with a status trailer
//! - Log uploads stored behind a small JSON envelope
//! - Health and Prometheus endpoints

pub mod body;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
