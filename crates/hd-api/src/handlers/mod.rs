//! Request handlers

pub mod auth;
pub mod roles;
pub mod tickets;
pub mod users;
