//! Index service handler
//!
//! The index service authenticates with short-lived bearer tokens. The
//! handler keeps at most one token and refreshes it under a mutex, so
//! concurrent callers that find it expired share a single acquisition.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::IndexSettings;
use crate::error::{Error, Result};

/// Token as returned by the auth endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,

    /// Lifetime reported by the server, if any
    pub expires_in: Option<Duration>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// One index known to the service
///
/// Fields other than `name` are kept as the server sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Transport for the index service
#[async_trait]
pub trait IndexApi: Send + Sync {
    /// Exchange the configured credentials for a token
    async fn request_token(&self) -> Result<IssuedToken>;

    /// Fetch every index visible to the token
    ///
    /// A rejected token is reported as [`Error::Authentication`].
    async fn list_indexes(&self, token: &str) -> Result<Vec<IndexMetadata>>;
}

/// Token held by the handler
#[derive(Clone)]
pub struct AuthToken {
    value: String,
    obtained_at: Instant,
    expires_at: Instant,
}

impl AuthToken {
    fn new(issued: IssuedToken, default_lifetime: Duration) -> Self {
        let obtained_at = Instant::now();
        let expires_at = issued
            .expires_in
            .and_then(|lifetime| obtained_at.checked_add(lifetime))
            .unwrap_or(obtained_at + default_lifetime);
        Self {
            value: issued.value,
            obtained_at,
            expires_at,
        }
    }

    /// Valid while `now < expires_at - margin`
    pub fn is_valid(&self, margin: Duration) -> bool {
        self.expires_at
            .checked_sub(margin)
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    pub fn age(&self) -> Duration {
        self.obtained_at.elapsed()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Observable token state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TokenStatus {
    Unauthenticated,
    Authenticated { remaining_secs: u64 },
    Expired,
}

/// Handler for the index service
pub struct IndexHandler {
    api: Arc<dyn IndexApi>,
    settings: IndexSettings,
    token: Mutex<Option<AuthToken>>,
}

impl IndexHandler {
    pub fn new(api: Arc<dyn IndexApi>, settings: IndexSettings) -> Self {
        Self {
            api,
            settings,
            token: Mutex::new(None),
        }
    }

    /// Acquire a new token, replacing any held one
    ///
    /// On failure the handler is left unauthenticated.
    pub async fn request_token(&self) -> Result<()> {
        let mut slot = self.token.lock().await;
        *slot = None;
        *slot = Some(self.acquire().await?);
        Ok(())
    }

    pub async fn token_state(&self) -> TokenStatus {
        let slot = self.token.lock().await;
        match slot.as_ref() {
            None => TokenStatus::Unauthenticated,
            Some(token) if token.is_valid(self.settings.refresh_margin()) => {
                TokenStatus::Authenticated {
                    remaining_secs: token
                        .expires_at
                        .saturating_duration_since(Instant::now())
                        .as_secs(),
                }
            }
            Some(_) => TokenStatus::Expired,
        }
    }

    async fn acquire(&self) -> Result<AuthToken> {
        let issued = self.api.request_token().await.map_err(|e| match e {
            Error::Authentication(_) | Error::BackendUnavailable(_) => e,
            other => Error::Authentication(other.to_string()),
        })?;
        let token = AuthToken::new(issued, self.settings.default_token_lifetime());
        info!(
            valid_for_secs = token.expires_at.saturating_duration_since(token.obtained_at).as_secs(),
            "acquired index token"
        );
        Ok(token)
    }

    /// A usable token, and whether it was acquired by this call
    async fn valid_token(&self) -> Result<(String, bool)> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_valid(self.settings.refresh_margin()) {
                return Ok((token.value.clone(), false));
            }
            debug!(age_secs = token.age().as_secs(), "index token expired");
        }

        *slot = None;
        let token = self.acquire().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok((value, true))
    }

    /// Replace a token the server refused
    async fn replace_rejected(&self, rejected: &str) -> Result<String> {
        let mut slot = self.token.lock().await;
        // a concurrent caller may have replaced it already
        if let Some(token) = slot.as_ref() {
            if token.value != rejected && token.is_valid(self.settings.refresh_margin()) {
                return Ok(token.value.clone());
            }
        }

        *slot = None;
        let token = self.acquire().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Every index visible to the credentials
    ///
    /// A rejected token is replaced once and the query retried once.
    pub async fn list_indexes(&self) -> Result<Vec<IndexMetadata>> {
        let (token, fresh) = self.valid_token().await?;
        match self.api.list_indexes(&token).await {
            Err(Error::Authentication(reason)) if !fresh => {
                warn!(reason = %reason, "index token rejected; re-authenticating");
                let token = self.replace_rejected(&token).await?;
                self.api.list_indexes(&token).await
            }
            result => result,
        }
    }

    pub async fn list_index_names(&self) -> Result<Vec<String>> {
        Ok(self
            .list_indexes()
            .await?
            .into_iter()
            .map(|index| index.name)
            .collect())
    }

    /// Metadata of one index by exact name
    pub async fn lookup_index(&self, name: &str) -> Result<IndexMetadata> {
        self.list_indexes()
            .await?
            .into_iter()
            .find(|index| index.name == name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }
}
