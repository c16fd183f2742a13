//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Local store fixtures
//! - Mock server helpers

pub mod database;
pub mod mock_server;

// Re-export commonly used utilities
pub use database::*;
pub use mock_server::*;
