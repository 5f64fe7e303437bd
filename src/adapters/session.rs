//! Token session backed by the REST API and a key-value store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::rest_api::error_from_response;
use crate::error::RawError;
use crate::traits::{KeyValueStore, SessionManager, StorageError};

/// Tokens persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionTokens {
    /// True once `expires_at` has passed. Tokens without an expiry never expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime of the new access token in seconds
    #[serde(default)]
    expires_in: Option<i64>,
}

/// [`SessionManager`] that refreshes tokens through `POST {api}/auth/refresh`.
///
/// Tokens are stored as JSON under `<namespace>.session`.
#[derive(Clone)]
pub struct TokenSession {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl TokenSession {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
    ) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, store, namespace)
    }

    /// Session using a preconfigured reqwest client.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            key: format!("{}.session", namespace),
        }
    }

    /// Storage key holding the tokens.
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Currently stored tokens, if any. Unreadable records count as absent.
    pub async fn tokens(&self) -> Result<Option<SessionTokens>, StorageError> {
        let Some(raw) = self.store.load(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                warn!("Discarding unreadable session record: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn access_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.tokens().await?.map(|t| t.access_token))
    }

    /// Persist a new token pair.
    pub async fn store_tokens(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        let json = serde_json::to_string(tokens).map_err(|e| StorageError::Serialization {
            key: self.key.clone(),
            message: e.to_string(),
        })?;
        self.store.save(&self.key, &json).await
    }
}

fn storage_failure(err: StorageError) -> RawError {
    RawError::Message(err.to_string())
}

#[async_trait]
impl SessionManager for TokenSession {
    async fn refresh_token(&self) -> Result<(), RawError> {
        let current = self.tokens().await.map_err(storage_failure)?;
        let Some(refresh_token) = current.as_ref().and_then(|t| t.refresh_token.clone()) else {
            return Err(RawError::Http {
                status: 401,
                message: Some("No refresh token available".to_string()),
                code: Some("NO_REFRESH_TOKEN".to_string()),
            });
        };

        debug!("Refreshing access token");
        let response = self
            .client
            .post(format!("{}/auth/refresh", self.base_url))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let data: RefreshResponse = response.json().await?;
        let tokens = SessionTokens {
            access_token: data.access_token,
            refresh_token: data.refresh_token.or(Some(refresh_token)),
            expires_at: data
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        };
        self.store_tokens(&tokens).await.map_err(storage_failure)?;
        info!("Access token refreshed");
        Ok(())
    }

    async fn clear_session(&self) {
        if let Err(e) = self.store.remove(&self.key).await {
            warn!("Failed to clear session: {}", e);
        } else {
            info!("Session cleared");
        }
    }
}

impl std::fmt::Debug for TokenSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSession")
            .field("base_url", &self.base_url)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
