//! Reqwest-based action submitter.
//!
//! Replays queued actions with `POST {api}/actions`. The action id travels
//! in the `Idempotency-Key` header so the backend can drop duplicates. The
//! body is the persisted action record.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::session::TokenSession;
use crate::error::RawError;
use crate::offline::QueuedAction;
use crate::traits::ActionSubmitter;

/// Error body shape returned by the API, `{ "message": .., "code": .. }`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Turn a non-success response into [`RawError::Http`].
///
/// A JSON body contributes its `message` and `code`; any other non-empty
/// body becomes the message.
pub(crate) async fn error_from_response(response: reqwest::Response) -> RawError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
        message: Some(text.trim().to_string()).filter(|m| !m.is_empty()),
        code: None,
    });
    RawError::Http {
        status,
        message: body.message,
        code: body.code,
    }
}

/// [`ActionSubmitter`] talking to the REST API.
///
/// # Example
///
/// ```ignore
/// use nutrilink::adapters::RestActionSubmitter;
///
/// let submitter = RestActionSubmitter::new(&config.api_base_url).with_session(session);
/// queue.flush(&submitter, &engine, &cancel).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RestActionSubmitter {
    client: reqwest::Client,
    base_url: String,
    session: Option<Arc<TokenSession>>,
}

impl RestActionSubmitter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a submitter with a custom reqwest::Client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Authenticate requests with the session's access token.
    pub fn with_session(mut self, session: Arc<TokenSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/actions", self.base_url)
    }
}

#[async_trait]
impl ActionSubmitter for RestActionSubmitter {
    async fn submit(&self, action: &QueuedAction) -> Result<(), RawError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", action.id.as_str())
            .json(action);

        if let Some(session) = &self.session {
            let tokens = session
                .tokens()
                .await
                .map_err(|e| RawError::Message(e.to_string()))?;
            if let Some(tokens) = tokens {
                // A stale token with a refresh token behind it is refreshed
                // by the caller instead of being sent and rejected.
                if tokens.is_expired() && tokens.refresh_token.is_some() {
                    debug!("Access token expired, not submitting action {}", action.id);
                    return Err(RawError::TokenExpired {
                        message: "access token expired".to_string(),
                    });
                }
                builder = builder.header("Authorization", format!("Bearer {}", tokens.access_token));
            }
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        debug!("Submitted action {} ({})", action.id, action.action_type());
        Ok(())
    }
}
