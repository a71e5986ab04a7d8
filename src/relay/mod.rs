//! Data Relay Module
//!
//! Handles bidirectional data relay between client and target.

pub mod conn;
pub mod engine;
pub mod session;

pub use conn::Connection;
pub use engine::RelayEngine;
pub use session::{ConnectionStats, Direction, RelaySession, SessionOutcome};
