//! checksum command

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use serde::Serialize;

use iris_core::{Error, file_checksum};

use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Arguments for the checksum command
#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Local file to hash
    pub file: PathBuf,
}

#[derive(Serialize)]
struct ChecksumOutput<'a> {
    path: &'a std::path::Path,
    sha256: &'a str,
}

/// Print the SHA-256 the upload path records for a file
pub async fn execute(args: ChecksumArgs, formatter: &Formatter) -> anyhow::Result<ExitCode> {
    if !args.file.is_file() {
        return Err(Error::LocalFileNotFound(args.file).into());
    }
    let checksum = file_checksum(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    if formatter.is_json() {
        formatter.json(&ChecksumOutput {
            path: &args.file,
            sha256: &checksum,
        });
    } else {
        formatter.println(&format!("{checksum}  {}", args.file.display()));
    }
    Ok(ExitCode::Success)
}
