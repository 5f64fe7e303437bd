//! Nutrilink - client resilience core for the nutrilink nutrition tracker
//!
//! - [`error`] classifies raw failures and drives automatic recovery
//! - [`connection`] keeps the real-time channel alive
//! - [`offline`] queues user writes made without connectivity and replays them
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod offline;
pub mod traits;
