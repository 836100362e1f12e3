//! Common utilities and shared functionality
//!
//! Identifiers, collaborator traits and their in-memory implementations.

pub mod memory;
pub mod traits;
pub mod types;
