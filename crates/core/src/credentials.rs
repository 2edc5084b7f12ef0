//! Credential model
//!
//! The credentials file has two sections, `hcp` for the object store and
//! `hci` for the index service. Each section must be either completely
//! filled in or completely empty. Validation happens once, here, so the
//! handlers receive strongly typed records and never re-check fields.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Unvalidated credentials, as read from the JSON file
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCredentials {
    #[serde(default)]
    pub hcp: RawObjectStoreSection,

    #[serde(default)]
    pub hci: RawIndexSection,
}

/// `hcp` section of the credentials file
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObjectStoreSection {
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub aws_access_key_id: String,

    #[serde(default)]
    pub aws_secret_access_key: String,
}

/// `hci` section of the credentials file
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIndexSection {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub auth_port: String,

    #[serde(default)]
    pub api_port: String,
}

/// Validated credentials for the object store
#[derive(Clone, PartialEq, Eq)]
pub struct ObjectStoreCredentials {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Validated credentials for the index service
#[derive(Clone, PartialEq, Eq)]
pub struct IndexCredentials {
    pub username: String,
    pub password: String,
    pub address: String,
    pub auth_port: String,
    pub api_port: String,
}

/// Validated credential record
///
/// At least one of the two sections is present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    object_store: Option<ObjectStoreCredentials>,
    index: Option<IndexCredentials>,
}

/// Classification of a section's fields
enum Completeness {
    Empty,
    Full,
    Partial(Vec<&'static str>),
}

fn completeness(fields: &[(&'static str, &str)]) -> Completeness {
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Completeness::Full
    } else if missing.len() == fields.len() {
        Completeness::Empty
    } else {
        Completeness::Partial(missing)
    }
}

impl RawCredentials {
    /// An all-empty record, used as the template for new credential files
    pub fn template() -> Self {
        Self::default()
    }

    /// Parse a credentials document
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read and parse a credentials file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::LocalFileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Validate completeness of both sections
    pub fn validate(self) -> Result<CredentialRecord> {
        let hcp = &self.hcp;
        let object_store = match completeness(&[
            ("endpoint", hcp.endpoint.as_str()),
            ("aws_access_key_id", hcp.aws_access_key_id.as_str()),
            ("aws_secret_access_key", hcp.aws_secret_access_key.as_str()),
        ]) {
            Completeness::Empty => None,
            Completeness::Full => Some(ObjectStoreCredentials {
                endpoint: hcp.endpoint.trim().to_string(),
                access_key_id: hcp.aws_access_key_id.trim().to_string(),
                secret_access_key: hcp.aws_secret_access_key.trim().to_string(),
            }),
            Completeness::Partial(missing) => {
                return Err(Error::IncompleteCredentials {
                    section: "hcp",
                    missing,
                });
            }
        };

        let hci = &self.hci;
        let index = match completeness(&[
            ("username", hci.username.as_str()),
            ("password", hci.password.as_str()),
            ("address", hci.address.as_str()),
            ("auth_port", hci.auth_port.as_str()),
            ("api_port", hci.api_port.as_str()),
        ]) {
            Completeness::Empty => None,
            Completeness::Full => Some(IndexCredentials {
                username: hci.username.trim().to_string(),
                password: hci.password.clone(),
                address: hci.address.trim().to_string(),
                auth_port: hci.auth_port.trim().to_string(),
                api_port: hci.api_port.trim().to_string(),
            }),
            Completeness::Partial(missing) => {
                return Err(Error::IncompleteCredentials {
                    section: "hci",
                    missing,
                });
            }
        };

        if object_store.is_none() && index.is_none() {
            return Err(Error::NoUsableCredentials(
                "both 'hcp' and 'hci' sections are empty".into(),
            ));
        }

        Ok(CredentialRecord {
            object_store,
            index,
        })
    }
}

impl CredentialRecord {
    /// Object store credentials, or an error naming the empty section
    pub fn object_store(&self) -> Result<&ObjectStoreCredentials> {
        self.object_store
            .as_ref()
            .ok_or_else(|| Error::NoUsableCredentials("the 'hcp' section is empty".into()))
    }

    /// Index credentials, or an error naming the empty section
    pub fn index(&self) -> Result<&IndexCredentials> {
        self.index
            .as_ref()
            .ok_or_else(|| Error::NoUsableCredentials("the 'hci' section is empty".into()))
    }

    pub fn has_object_store(&self) -> bool {
        self.object_store.is_some()
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }
}

impl ObjectStoreCredentials {
    /// Endpoint as a URL, defaulting to https when no scheme is given
    pub fn endpoint_url(&self) -> Result<Url> {
        let endpoint = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("https://{}", self.endpoint)
        };
        Ok(Url::parse(&endpoint)?)
    }
}

impl IndexCredentials {
    fn base_url(&self, port: &str) -> Result<Url> {
        let address = self
            .address
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let port: u16 = port
            .parse()
            .map_err(|_| Error::Config(format!("Invalid port '{port}' in 'hci' section")))?;
        Ok(Url::parse(&format!("https://{address}:{port}/"))?)
    }

    /// Base URL of the authentication service
    pub fn auth_url(&self) -> Result<Url> {
        self.base_url(&self.auth_port)
    }

    /// Base URL of the search API
    pub fn api_url(&self) -> Result<Url> {
        self.base_url(&self.api_port)
    }
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredentials")
            .field("hcp", &self.hcp)
            .field("hci", &self.hci)
            .finish()
    }
}

impl fmt::Debug for RawObjectStoreSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawObjectStoreSection")
            .field("endpoint", &self.endpoint)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for RawIndexSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawIndexSection")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("address", &self.address)
            .field("auth_port", &self.auth_port)
            .field("api_port", &self.api_port)
            .finish()
    }
}

impl fmt::Debug for ObjectStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreCredentials")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for IndexCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCredentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("address", &self.address)
            .field("auth_port", &self.auth_port)
            .field("api_port", &self.api_port)
            .finish()
    }
}
