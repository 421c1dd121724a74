//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Handle types and generational collections
//! - Logging utilities

pub mod collections;
pub mod logging;
