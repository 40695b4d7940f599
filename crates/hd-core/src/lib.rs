//! # hd-core
//!
//! Core types, errors, and configuration for Helpdesk RS.
//!
//! Foundational building blocks shared by all other crates:
//! - The common error taxonomy with HTTP status mapping
//! - Result type alias
//! - The primary key type
//! - Application configuration loaded from the environment

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, AuthConfig, DatabaseConfig, ServerConfig};
pub use error::{HdError, HdResult};
pub use types::Id;
