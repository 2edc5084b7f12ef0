//! CLI command definitions and execution
//!
//! Commands that talk to a backend take the credentials file as the first
//! positional argument (`iris CREDENTIALS <command>`) and share a
//! [`Session`] built from it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;

use iris_backend::{HciClient, S3Client};
use iris_core::{
    Config, ConfigManager, CredentialRecord, Error, IndexHandler, ObjectStoreHandler,
    RawCredentials, TransferReport,
};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod acl;
mod buckets;
mod checksum;
pub mod completions;
mod credentials;
mod index;
mod objects;
mod transfer;

/// iris - client for HCP object storage and the HCI index service
#[derive(Parser, Debug)]
#[command(name = "iris")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Credentials file with "hcp" and "hci" sections
    #[arg(value_name = "CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress spinners
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List buckets visible to the credentials
    ListBuckets,

    /// Check that a bucket is reachable with the credentials
    TestConnection(buckets::TestConnectionArgs),

    /// List objects in a bucket
    ListObjects(objects::ListObjectsArgs),

    /// Find object keys containing a text
    SimpleSearch(objects::SearchArgs),

    /// Delete one object
    DeleteObject(objects::DeleteObjectArgs),

    /// Delete a folder and the objects directly under it
    DeleteFolder(objects::DeleteFolderArgs),

    /// Upload a file or a folder
    Upload(transfer::UploadArgs),

    /// Download one object into a local folder
    Download(transfer::DownloadArgs),

    /// Download every object of a bucket
    DownloadAll(transfer::DownloadAllArgs),

    /// Show the ACL of a bucket or object
    GetAcl(acl::GetAclArgs),

    /// Grant a permission on a bucket or object
    SetAcl(acl::SetAclArgs),

    /// List indexes of the index service
    ListIndexes,

    /// Show the metadata of one index
    LookupIndex(index::LookupIndexArgs),

    /// Print the SHA-256 of a local file
    Checksum(checksum::ChecksumArgs),

    /// Write an empty credentials file to fill in
    GenerateCredentials(credentials::GenerateArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let flags = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };

    if let Commands::Completions(args) = cli.command {
        return completions::execute(args);
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            flags.apply_colors();
            Formatter::new(flags).error(&format!("{e:#}"));
            return ExitCode::from_anyhow(&e);
        }
    };

    let output_config = flags.with_defaults(&config.defaults);
    output_config.apply_colors();
    let formatter = Formatter::new(output_config);

    let result = match cli.command {
        Commands::GenerateCredentials(args) => credentials::execute(args, &formatter),
        Commands::Checksum(args) => checksum::execute(args, &formatter).await,
        command => match cli.credentials {
            Some(path) => run_with_session(command, &path, config, &formatter).await,
            None => Err(Error::NoUsableCredentials(
                "pass the credentials file before the command (iris CREDENTIALS <command>)".into(),
            )
            .into()),
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            ExitCode::from_anyhow(&e)
        }
    }
}

async fn run_with_session(
    command: Commands,
    credentials: &Path,
    config: Config,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let session = Session::open(credentials, config)?;

    match command {
        Commands::ListBuckets => buckets::list(&session, formatter).await,
        Commands::TestConnection(args) => buckets::test_connection(args, &session, formatter).await,
        Commands::ListObjects(args) => objects::list(args, &session, formatter).await,
        Commands::SimpleSearch(args) => objects::search(args, &session, formatter).await,
        Commands::DeleteObject(args) => objects::delete_object(args, &session, formatter).await,
        Commands::DeleteFolder(args) => objects::delete_folder(args, &session, formatter).await,
        Commands::Upload(args) => transfer::upload(args, &session, formatter).await,
        Commands::Download(args) => transfer::download(args, &session, formatter).await,
        Commands::DownloadAll(args) => transfer::download_all(args, &session, formatter).await,
        Commands::GetAcl(args) => acl::get(args, &session, formatter).await,
        Commands::SetAcl(args) => acl::set(args, &session, formatter).await,
        Commands::ListIndexes => index::list(&session, formatter).await,
        Commands::LookupIndex(args) => index::lookup(args, &session, formatter).await,
        Commands::Checksum(_) | Commands::GenerateCredentials(_) | Commands::Completions(_) => {
            Ok(ExitCode::UsageError)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path.to_path_buf()),
        None => ConfigManager::new()?,
    };
    manager
        .load()
        .with_context(|| format!("Failed to load {}", manager.config_path().display()))
}

/// Validated credentials plus settings, shared by backend commands
pub struct Session {
    record: CredentialRecord,
    config: Config,
}

impl Session {
    /// Read and validate the credentials file
    pub fn open(credentials: &Path, config: Config) -> anyhow::Result<Self> {
        let record = RawCredentials::load(credentials)
            .and_then(RawCredentials::validate)
            .with_context(|| format!("Invalid credentials file {}", credentials.display()))?;
        tracing::debug!(
            object_store = record.has_object_store(),
            index = record.has_index(),
            "credentials validated"
        );
        Ok(Self { record, config })
    }

    /// Object-store handler with no bucket mounted
    pub async fn object_store(&self) -> anyhow::Result<ObjectStoreHandler> {
        let credentials = self.record.object_store()?;
        let client =
            S3Client::connect(credentials, &self.config.connection, &self.config.transfer).await?;
        Ok(ObjectStoreHandler::new(
            Arc::new(client),
            self.config.transfer.clone(),
        ))
    }

    /// Object-store handler bound to `bucket`
    pub async fn mounted(&self, bucket: &str) -> anyhow::Result<ObjectStoreHandler> {
        let mut handler = self.object_store().await?;
        handler
            .mount_bucket(bucket)
            .await
            .with_context(|| format!("Failed to mount bucket '{bucket}'"))?;
        Ok(handler)
    }

    /// Index handler; no token is requested until the first query
    pub fn index(&self) -> anyhow::Result<IndexHandler> {
        let credentials = self.record.index()?;
        let client = HciClient::new(credentials, &self.config.connection)?;
        Ok(IndexHandler::new(
            Arc::new(client),
            self.config.index.clone(),
        ))
    }
}

#[derive(Serialize)]
struct FailedItem<'a> {
    key: &'a str,
    local_path: &'a Path,
    error: String,
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    succeeded: Vec<&'a iris_core::TransferReceipt>,
    failed: Vec<FailedItem<'a>>,
    bytes_transferred: u64,
}

/// One-line summary of a bulk transfer
pub(crate) fn report_summary(verb: &str, report: &TransferReport) -> String {
    format!(
        "{verb} {} of {} file(s), {}",
        report.success_count(),
        report.len(),
        humansize::format_size(report.bytes_transferred(), humansize::BINARY)
    )
}

/// Print a bulk transfer report and pick the exit code
///
/// Any failed item makes the command fail with the code of the first failure.
pub(crate) fn print_report(verb: &str, report: &TransferReport, formatter: &Formatter) -> ExitCode {
    if formatter.is_json() {
        let output = ReportOutput {
            succeeded: report.succeeded().collect(),
            failed: report
                .failed()
                .map(|(item, error)| FailedItem {
                    key: &item.key,
                    local_path: &item.local_path,
                    error: error.to_string(),
                })
                .collect(),
            bytes_transferred: report.bytes_transferred(),
        };
        formatter.json(&output);
    } else {
        for (item, error) in report.failed() {
            formatter.error(&format!("{}: {error}", item.local_path.display()));
        }
        if report.is_success() {
            formatter.success(&report_summary(verb, report));
        } else {
            formatter.warning(&report_summary(verb, report));
        }
    }

    report
        .failed()
        .next()
        .map_or(ExitCode::Success, |(_, error)| ExitCode::from_error(error))
}
