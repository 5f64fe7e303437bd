//! Adapter implementations for trait abstractions.
//!
//! This module provides concrete implementations of the traits defined in
//! `crate::traits`, allowing the resilience core to run against real
//! infrastructure or be tested with mocks.
//!
//! # Production Adapters
//!
//! - [`TungsteniteTransport`] - WebSocket channels via tokio-tungstenite
//! - [`FileStore`] - One JSON file per key on local disk
//! - [`RestActionSubmitter`] - Action replay via reqwest
//! - [`TokenSession`] - Token refresh via reqwest
//!
//! # Mock Adapters (for testing)
//!
//! See the [`mock`] module for test implementations.

pub mod file_store;
pub mod mock;
pub mod rest_api;
pub mod session;
pub mod tungstenite_ws;

pub use file_store::FileStore;
pub use rest_api::RestActionSubmitter;
pub use session::{SessionTokens, TokenSession};
pub use tungstenite_ws::TungsteniteTransport;
