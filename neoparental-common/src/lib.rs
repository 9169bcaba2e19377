//! # NeoParental Common Library
//!
//! Shared code for the NeoParental services:
//! - Bootstrap configuration loading (TOML file + defaults)
//! - Common error type

pub mod config;
pub mod error;

pub use config::ServiceConfig;
pub use error::{Error, Result};
