//! iris-core: Core library for the iris HCP/HCI client
//!
//! This crate provides the backend-independent part of iris:
//! - Credential validation
//! - Configuration management
//! - Base64 and checksum helpers
//! - The [`ObjectStore`] and [`IndexApi`] traits
//! - [`ObjectStoreHandler`] and [`IndexHandler`]
//!
//! SDK-specific clients live in `iris-backend`, which keeps this crate
//! testable against in-memory implementations.

pub mod acl;
pub mod config;
pub mod credentials;
pub mod encoding;
pub mod error;
pub mod handler;
pub mod index;
pub mod traits;
pub mod transfer;

pub use acl::{AccessControlList, Grant, Permission, parse_grants};
pub use config::{
    Config, ConfigManager, ConnectionSettings, Defaults, IndexSettings, TransferSettings,
};
pub use credentials::{CredentialRecord, IndexCredentials, ObjectStoreCredentials, RawCredentials};
pub use encoding::{
    CHECKSUM_METADATA_KEY, content_checksum, file_checksum, from_base64, from_base64_url,
    to_base64, to_base64_url,
};
pub use error::{Error, Result};
pub use handler::{ObjectEntry, ObjectStoreHandler};
pub use index::{AuthToken, IndexApi, IndexHandler, IndexMetadata, IssuedToken, TokenStatus};
pub use traits::{ListOptions, ObjectInfo, ObjectPage, ObjectStore};
pub use transfer::{
    DeleteReport, ItemResult, TransferItem, TransferOutcome, TransferReceipt, TransferReport,
    local_path_for_key,
};
