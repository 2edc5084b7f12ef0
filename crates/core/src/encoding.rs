//! Base64 and checksum helpers
//!
//! Checksums are lowercase hex SHA-256 digests. They are stored as object
//! metadata on upload and compared against a recomputed digest on download.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// Object metadata key holding the SHA-256 of the uploaded content
pub const CHECKSUM_METADATA_KEY: &str = "sha256";

const CHECKSUM_BUFFER_SIZE: usize = 64 * 1024;

/// Encode text as standard, padded base64
pub fn to_base64(text: &str) -> String {
    general_purpose::STANDARD.encode(text.as_bytes())
}

/// Decode standard base64 back into text
pub fn from_base64(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidEncoding(e.to_string()))
}

/// URL-safe, unpadded base64, usable inside object names
pub fn to_base64_url(text: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(text.as_bytes())
}

/// Decode URL-safe, unpadded base64
pub fn from_base64_url(encoded: &str) -> Result<String> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::InvalidEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidEncoding(e.to_string()))
}

/// SHA-256 of a byte slice, as lowercase hex
pub fn content_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a file's content, read in chunks
pub async fn file_checksum(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
