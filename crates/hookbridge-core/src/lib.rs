//! Core types and configuration shared by the Hookbridge crates.
//!
//! - [`config`]: layered application configuration (defaults, file, environment)
//! - [`types`]: identifiers, routing keys, display data and verification policy

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
