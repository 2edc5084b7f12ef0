//! HCI index service client
//!
//! Implements [`IndexApi`] over the service's REST endpoints: a password
//! grant on the auth port and the index listing on the API port.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use iris_core::{
    ConnectionSettings, Error, IndexApi, IndexCredentials, IndexMetadata, IssuedToken, Result,
};

const CLIENT_ID: &str = "hci-client";
const REALM: &str = "LOCAL";

/// HTTP client for the index service
pub struct HciClient {
    http_client: Client,
    credentials: IndexCredentials,
    token_url: Url,
    indexes_url: Url,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl HciClient {
    /// Create a client from validated credentials
    pub fn new(credentials: &IndexCredentials, connection: &ConnectionSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(!connection.verify_tls)
            .connect_timeout(connection.connect_timeout());
        if let Some(proxy) = connection.proxy_url()? {
            debug!(proxy_host = ?proxy.host_str(), "routing index requests through proxy");
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| Error::Config(format!("Invalid connection.proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::BackendUnavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            credentials: credentials.clone(),
            token_url: credentials.auth_url()?.join("auth/oauth/")?,
            indexes_url: credentials.api_url()?.join("api/search/indexes/")?,
        })
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn indexes_url(&self) -> &Url {
        &self.indexes_url
    }

    /// Map HTTP status codes to appropriate errors
    fn map_error(status: StatusCode, body: &str) -> Error {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::Authentication(format!("HTTP {}: {}", status.as_u16(), body))
            }
            _ => Error::BackendUnavailable(format!("HTTP {}: {}", status.as_u16(), body)),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(Self::map_error(status, body.trim()))
    }
}

impl fmt::Debug for HciClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HciClient")
            .field("token_url", &self.token_url.as_str())
            .field("indexes_url", &self.indexes_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IndexApi for HciClient {
    async fn request_token(&self) -> Result<IssuedToken> {
        let form = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("scope", "*"),
            ("client_secret", CLIENT_ID),
            ("client_id", CLIENT_ID),
            ("realm", REALM),
        ];

        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Request failed: {e}")))?;

        let token: TokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Authentication(format!("Malformed token response: {e}")))?;

        debug!(expires_in = ?token.expires_in, "received index token");
        Ok(IssuedToken {
            value: token.access_token,
            expires_in: token.expires_in.map(Duration::from_secs),
        })
    }

    async fn list_indexes(&self, token: &str) -> Result<Vec<IndexMetadata>> {
        let response = self
            .http_client
            .get(self.indexes_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Request failed: {e}")))?;

        let text = Self::check(response)
            .await?
            .text()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Failed to read response: {e}")))?;

        Ok(serde_json::from_str(&text)?)
    }
}
