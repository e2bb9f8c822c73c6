//! # Forge Common Library
//!
//! Shared code for the Forge services:
//! - Error type shared by configuration and persistence layers
//! - Configuration loading (environment + optional TOML override file)
//! - Root folder resolution
//! - SQLite pool initialization

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
