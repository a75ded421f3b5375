//! pgexpose Common Library
//!
//! Shared error and configuration types for all pgexpose crates.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{NameConversion, SerializationSettings};
pub use error::{PgExposeError, Result};
