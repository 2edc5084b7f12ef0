//! Integration tests for the iris CLI against a live deployment
//!
//! These tests need a reachable HCP tenant and, for the index tests, an HCI
//! instance. The bucket must already exist; every test works under its own
//! key prefix and removes what it uploads.
//!
//! Run with:
//! ```bash
//! export IRIS_TEST_CREDENTIALS=/path/to/credentials.json
//! export IRIS_TEST_BUCKET=iris-ci
//! export IRIS_TEST_INDEX=genomes   # optional, enables the index tests
//! cargo test -p iris-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

struct Live {
    credentials: PathBuf,
    bucket: String,
    config_dir: TempDir,
}

impl Live {
    /// None when the live environment is not configured
    fn from_env() -> Option<Self> {
        let credentials = std::env::var_os("IRIS_TEST_CREDENTIALS")?.into();
        let bucket = std::env::var("IRIS_TEST_BUCKET").ok()?;
        Some(Self {
            credentials,
            bucket,
            config_dir: tempfile::tempdir().ok()?,
        })
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_iris"))
            .arg(&self.credentials)
            .args(args)
            .env("IRIS_CONFIG_DIR", self.config_dir.path())
            .output()
            .expect("Failed to execute iris")
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let mut args = args.to_vec();
        args.push("--json");
        let output = self.run(&args);
        assert!(
            output.status.success(),
            "iris {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("output is JSON")
    }
}

macro_rules! live_or_skip {
    () => {
        match Live::from_env() {
            Some(live) => live,
            None => {
                eprintln!("Skipping: IRIS_TEST_CREDENTIALS / IRIS_TEST_BUCKET not set");
                return;
            }
        }
    };
}

fn unique_prefix(test: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("iris-it/{test}-{nanos}")
}

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn test_connection_and_bucket_listing() {
    let live = live_or_skip!();

    let output = live.run(&["test-connection", &live.bucket]);
    assert!(output.status.success());

    let buckets = live.run_json(&["list-buckets"]);
    let names: Vec<&str> = buckets
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b.as_str())
        .collect();
    assert!(names.contains(&live.bucket.as_str()));
}

#[test]
fn test_missing_bucket_exit_code() {
    let live = live_or_skip!();
    let output = live.run(&["test-connection", "iris-it-no-such-bucket-0f3a"]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn test_file_round_trip() {
    let live = live_or_skip!();
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("reads.fastq");
    write(&source, b"@r1\nACGT\n+\nIIII\n");
    let key = format!("{}/reads.fastq", unique_prefix("file"));

    let receipt = live.run_json(&["upload", &live.bucket, source.to_str().unwrap(), &key]);
    assert_eq!(receipt["key"], key.as_str());
    assert_eq!(receipt["size_bytes"], 16);

    let keys = live.run_json(&["list-objects", &live.bucket, "--name-only"]);
    assert!(keys.as_array().unwrap().iter().any(|k| k == key.as_str()));

    let target = work.path().join("out");
    let output = live.run(&["download", &live.bucket, &key, target.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(
        std::fs::read(target.join("reads.fastq")).unwrap(),
        std::fs::read(&source).unwrap()
    );

    // A second download without --force must not overwrite
    let output = live.run(&["download", &live.bucket, &key, target.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(6));

    let output = live.run(&["delete-object", &live.bucket, &key]);
    assert!(output.status.success());
    let output = live.run(&["delete-object", &live.bucket, &key]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn test_folder_upload_and_delete() {
    let live = live_or_skip!();
    let work = tempfile::tempdir().unwrap();
    let folder = work.path().join("run");
    write(&folder.join("a.txt"), b"alpha");
    write(&folder.join("b.txt"), b"beta");
    write(&folder.join("empty.txt"), b"");
    let prefix = unique_prefix("folder");

    let report = live.run_json(&["upload", &live.bucket, folder.to_str().unwrap(), &prefix]);
    assert_eq!(report["succeeded"].as_array().unwrap().len(), 3);
    assert!(report["failed"].as_array().unwrap().is_empty());

    let hits = live.run_json(&["simple-search", &live.bucket, &prefix]);
    assert_eq!(hits.as_array().unwrap().len(), 3);

    let output = live.run(&["delete-folder", &live.bucket, &prefix]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_index_lookup() {
    let live = live_or_skip!();
    let Ok(index) = std::env::var("IRIS_TEST_INDEX") else {
        eprintln!("Skipping: IRIS_TEST_INDEX not set");
        return;
    };

    let names = live.run_json(&["list-indexes"]);
    assert!(names.as_array().unwrap().iter().any(|i| i["name"] == index.as_str()));

    let metadata = live.run_json(&["lookup-index", &index]);
    assert_eq!(metadata["name"], index.as_str());

    let output = live.run(&["lookup-index", "iris-it-no-such-index"]);
    assert_eq!(output.status.code(), Some(5));
}
