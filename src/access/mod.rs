//! Access Control Module
//!
//! Source IP allowlisting for inbound client connections.

pub mod acl;

pub use acl::{is_allowed, AccessList};
