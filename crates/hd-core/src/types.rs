//! Common types used throughout Helpdesk RS

/// Primary key type for all persisted entities
pub type Id = i64;
