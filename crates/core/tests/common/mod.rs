#![allow(dead_code)]

pub mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use iris_core::{ObjectStoreHandler, TransferSettings};

use memory::MemoryStore;

pub const BUCKET: &str = "sequencing-runs";

/// A handler with `BUCKET` already mounted
pub async fn mounted(store: Arc<MemoryStore>, settings: TransferSettings) -> ObjectStoreHandler {
    let mut handler = ObjectStoreHandler::new(store, settings);
    handler.mount_bucket(BUCKET).await.unwrap();
    handler
}

/// Every file under `root` as (relative path, content), sorted
pub fn snapshot_tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                out.push((relative, std::fs::read(&path).unwrap()));
            }
        }
    }

    let mut files = Vec::new();
    walk(root, root, &mut files);
    files.sort();
    files
}
