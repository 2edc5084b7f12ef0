//! Transfer items and bulk transfer reports
//!
//! A bulk operation turns its input into [`TransferItem`]s and produces
//! exactly one [`TransferOutcome`] per item. Per-item failures are values in
//! the report, not errors of the bulk operation.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// A local file paired with its object key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TransferItem {
    pub local_path: PathBuf,
    pub key: String,
}

impl TransferItem {
    pub fn new(local_path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            key: key.into(),
        }
    }

    /// Enumerate every file under `folder`, recursively
    ///
    /// Keys are the paths relative to `folder` joined with `/`, under
    /// `prefix` when one is given. Directories themselves produce no items.
    pub fn collect_folder(folder: &Path, prefix: Option<&str>) -> Result<Vec<Self>> {
        if !folder.is_dir() {
            return Err(Error::LocalFileNotFound(folder.to_path_buf()));
        }

        fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    walk_dir(&path, files)?;
                } else {
                    files.push(path);
                }
            }
            Ok(())
        }

        let mut files = Vec::new();
        walk_dir(folder, &mut files)?;
        files.sort();

        let items = files
            .into_iter()
            .map(|path| {
                let relative = path.strip_prefix(folder).unwrap_or(&path);
                let key = join_key(prefix, &relative_key(relative));
                Self::new(path, key)
            })
            .collect();

        Ok(items)
    }
}

/// Object key for a relative local path
fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_key(prefix: Option<&str>, key: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/{key}"),
        _ => key.to_string(),
    }
}

/// Local path under `root` for an object key
///
/// Rejects keys that are absolute or would leave `root`.
pub fn local_path_for_key(root: &Path, key: &str) -> Result<PathBuf> {
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() || key.starts_with('/') {
        return Err(Error::transfer(key, "key does not map to a local path"));
    }

    let mut path = root.to_path_buf();
    for part in trimmed.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(Error::transfer(key, "key escapes the target folder")),
            _ => path.push(part),
        }
    }
    Ok(path)
}

/// Result of one successful transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub key: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,

    /// SHA-256 of the transferred content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Per-item result
#[derive(Debug)]
pub enum ItemResult {
    Success(TransferReceipt),
    Failure(Error),
}

/// Outcome of one item in a bulk transfer
#[derive(Debug)]
pub struct TransferOutcome {
    pub item: TransferItem,
    pub result: ItemResult,
}

impl TransferOutcome {
    pub fn from_result(item: TransferItem, result: Result<TransferReceipt>) -> Self {
        let result = match result {
            Ok(receipt) => ItemResult::Success(receipt),
            Err(e) => ItemResult::Failure(e),
        };
        Self { item, result }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, ItemResult::Success(_))
    }
}

/// Aggregate result of a bulk transfer, one outcome per item
///
/// Outcomes are kept in completion order.
#[derive(Debug, Default)]
pub struct TransferReport {
    outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    pub fn push(&mut self, outcome: TransferOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[TransferOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<TransferOutcome> {
        self.outcomes
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TransferReceipt> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            ItemResult::Success(receipt) => Some(receipt),
            ItemResult::Failure(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&TransferItem, &Error)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            ItemResult::Failure(e) => Some((&o.item, e)),
            ItemResult::Success(_) => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Total bytes of successful transfers
    pub fn bytes_transferred(&self) -> u64 {
        self.succeeded().map(|r| r.size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when every item succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TransferOutcome::is_success)
    }
}

impl FromIterator<TransferOutcome> for TransferReport {
    fn from_iter<I: IntoIterator<Item = TransferOutcome>>(iter: I) -> Self {
        Self {
            outcomes: iter.into_iter().collect(),
        }
    }
}

impl Extend<TransferOutcome> for TransferReport {
    fn extend<I: IntoIterator<Item = TransferOutcome>>(&mut self, iter: I) {
        self.outcomes.extend(iter);
    }
}

/// Per-key outcome of a batch delete
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl DeleteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
