//! Mock implementations for testing.
//!
//! This module provides mock implementations of all trait abstractions,
//! enabling unit testing without network dependencies or file system access.
//!
//! # Available Mocks
//!
//! - [`MockTransport`] - Channel transport with a scriptable server side
//! - [`InMemoryStore`] - In-memory key-value storage
//! - [`MockActionSubmitter`] - Action submission with injectable failures
//! - [`MockSession`] - Session with a scripted refresh result

pub mod session;
pub mod store;
pub mod submitter;
pub mod transport;

pub use session::MockSession;
pub use store::InMemoryStore;
pub use submitter::MockActionSubmitter;
pub use transport::{MockPeer, MockTransport};
