//! upload, download and download-all commands

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Args;

use iris_core::{Error, TransferReceipt};

use super::{Session, print_report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Arguments for the upload command
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Destination bucket
    pub bucket: String,

    /// Local file or folder
    pub source: PathBuf,

    /// Object key for a file, or key prefix for a folder
    pub destination: Option<String>,
}

/// Arguments for the download command
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Source bucket
    pub bucket: String,

    /// Key of the object to download
    pub key: String,

    /// Local folder to download into
    pub destination: PathBuf,

    /// Overwrite an existing local file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the download-all command
#[derive(Args, Debug)]
pub struct DownloadAllArgs {
    /// Source bucket
    pub bucket: String,

    /// Local folder to download into
    pub destination: PathBuf,
}

pub async fn upload(
    args: UploadArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;

    if args.source.is_dir() {
        let spinner = ProgressBar::spinner(
            formatter.config(),
            &format!("Uploading {}...", args.source.display()),
        );
        let report = handler
            .upload_folder(&args.source, args.destination.as_deref())
            .await;
        spinner.finish_and_clear();
        let report =
            report.with_context(|| format!("Failed to upload {}", args.source.display()))?;
        return Ok(print_report("Uploaded", &report, formatter));
    }

    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Uploading {}...", args.source.display()),
    );
    let receipt = handler
        .upload_file(&args.source, args.destination.as_deref())
        .await;
    spinner.finish_and_clear();
    let receipt =
        receipt.with_context(|| format!("Failed to upload {}", args.source.display()))?;

    print_receipt(
        &format!(
            "Uploaded {} to {}/{}",
            receipt.local_path.display(),
            args.bucket,
            receipt.key
        ),
        &receipt,
        formatter,
    );
    Ok(ExitCode::Success)
}

pub async fn download(
    args: DownloadArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let local_path = download_target(&args.key, &args.destination, args.force)?;
    let handler = session.mounted(&args.bucket).await?;

    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Downloading {}...", args.key),
    );
    let receipt = handler.download_file(&args.key, &local_path).await;
    spinner.finish_and_clear();
    let receipt = receipt.with_context(|| format!("Failed to download '{}'", args.key))?;

    print_receipt(
        &format!(
            "Downloaded {}/{} to {}",
            args.bucket,
            receipt.key,
            receipt.local_path.display()
        ),
        &receipt,
        formatter,
    );
    Ok(ExitCode::Success)
}

pub async fn download_all(
    args: DownloadAllArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;

    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Downloading bucket '{}'...", args.bucket),
    );
    let report = handler.download_all_objects(&args.destination).await;
    spinner.finish_and_clear();
    let report = report.with_context(|| format!("Failed to download bucket '{}'", args.bucket))?;

    Ok(print_report("Downloaded", &report, formatter))
}

/// Local file for `key` inside `destination`, named after the key's last segment
fn download_target(key: &str, destination: &Path, force: bool) -> Result<PathBuf, Error> {
    let name = key.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return Err(Error::Conflict(format!(
            "'{key}' is a folder; use download-all to fetch a whole bucket"
        )));
    }

    let local_path = destination.join(name);
    if local_path.exists() && !force {
        return Err(Error::Conflict(format!(
            "{} already exists; use --force to overwrite",
            local_path.display()
        )));
    }
    Ok(local_path)
}

fn print_receipt(message: &str, receipt: &TransferReceipt, formatter: &Formatter) {
    if formatter.is_json() {
        formatter.json(receipt);
    } else {
        formatter.success(&format!(
            "{message} ({})",
            humansize::format_size(receipt.size_bytes, humansize::BINARY)
        ));
    }
}
