//! Session management trait abstraction.
//!
//! The recovery engine needs exactly two things from the authentication
//! layer: a way to refresh the access token and a way to drop the local
//! session so the user is forced to sign in again.

use async_trait::async_trait;

use crate::error::RawError;

/// Trait for the authentication session used by the recovery engine.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Exchange the refresh token for a new access token.
    ///
    /// # Returns
    /// Ok(()) once the new token is stored, or the raw failure
    async fn refresh_token(&self) -> Result<(), RawError>;

    /// Drop all local session state (tokens, cached identity).
    async fn clear_session(&self);
}
