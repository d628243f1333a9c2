//! # Observability Infrastructure
//!
//! Structured logging for the provider vault.

pub mod logging;

pub use logging::{init_logging, log_config_info};
