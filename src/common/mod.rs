//! Common Infrastructure
//!
//! Shared error aggregation for the engine.

pub mod error;

pub use error::{Result, ZrailError};
