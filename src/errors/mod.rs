//! # Error Handling
//!
//! Error types for the provider vault, built on `thiserror`.

pub mod types;

pub use types::{Error, Result};
