//! Access control lists
//!
//! Permission levels are a closed set. Strings coming from callers are parsed
//! into [`Permission`] before any request reaches the backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// S3 ACL permission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    FullControl,
    Write,
    WriteAcp,
    Read,
    ReadAcp,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::FullControl,
        Permission::Write,
        Permission::WriteAcp,
        Permission::Read,
        Permission::ReadAcp,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Permission::FullControl => "FULL_CONTROL",
            Permission::Write => "WRITE",
            Permission::WriteAcp => "WRITE_ACP",
            Permission::Read => "READ",
            Permission::ReadAcp => "READ_ACP",
        }
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::InvalidPermission(s.to_string()))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One grant of a permission to a canonical user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Canonical user id or display name
    pub grantee_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grantee_display_name: Option<String>,

    pub permission: Permission,
}

impl Grant {
    pub fn new(grantee_id: impl Into<String>, permission: Permission) -> Self {
        Self {
            grantee_id: grantee_id.into(),
            grantee_display_name: None,
            permission,
        }
    }
}

/// ACL of a bucket or object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    pub grants: Vec<Grant>,
}

/// Parse `(principal, permission)` pairs into grants
///
/// Fails on the first unrecognized permission; nothing is returned partially.
pub fn parse_grants<P, L>(entries: &[(P, L)]) -> Result<Vec<Grant>>
where
    P: AsRef<str>,
    L: AsRef<str>,
{
    entries
        .iter()
        .map(|(principal, level)| {
            let permission = level.as_ref().parse::<Permission>()?;
            Ok(Grant::new(principal.as_ref(), permission))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_permission() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>().unwrap(), permission);
        }
    }

    #[test]
    fn test_parse_is_exact() {
        for bad in ["read", "FULL-CONTROL", "", "ADMIN", " READ"] {
            assert!(matches!(
                bad.parse::<Permission>(),
                Err(Error::InvalidPermission(_))
            ));
        }
    }

    #[test]
    fn test_parse_grants_rejects_whole_batch() {
        let entries = [("alice", "READ"), ("bob", "EVERYTHING")];
        let err = parse_grants(&entries).unwrap_err();
        assert!(matches!(err, Error::InvalidPermission(level) if level == "EVERYTHING"));
    }

    #[test]
    fn test_parse_grants() {
        let entries = vec![("alice".to_string(), "WRITE_ACP".to_string())];
        let grants = parse_grants(&entries).unwrap();
        assert_eq!(grants, vec![Grant::new("alice", Permission::WriteAcp)]);
    }

    #[test]
    fn test_serialize_permission() {
        let json = serde_json::to_string(&Permission::FullControl).unwrap();
        assert_eq!(json, "\"FULL_CONTROL\"");
    }
}
