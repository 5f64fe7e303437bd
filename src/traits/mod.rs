//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`ChannelTransport`] - Opening the real-time channel
//! - [`KeyValueStore`] - Durable local storage
//! - [`ActionSubmitter`] - Submitting queued actions to the backend
//! - [`SessionManager`] - Token refresh and session teardown

pub mod session;
pub mod storage;
pub mod submitter;
pub mod transport;

pub use session::SessionManager;
pub use storage::{KeyValueStore, StorageError};
pub use submitter::ActionSubmitter;
pub use transport::{Channel, ChannelTransport, TransportError};
