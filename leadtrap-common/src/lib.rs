//! # Leadtrap Common Library
//!
//! Shared code for the leadtrap engine:
//! - Error taxonomy
//! - Configuration loading (ENV -> TOML -> defaults)
//! - SQLite database initialization and schema creation

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
