//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Error handling and result types
//! - Settings persistence
//! - Enrollment store persistence

pub mod error;
pub mod settings;
pub mod store;
