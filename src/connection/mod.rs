//! Connection Management Module
//!
//! Handles TCP connection acceptance and dispatch to relay sessions.

pub mod manager;

pub use manager::ConnectionManager;
