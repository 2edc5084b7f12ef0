//! list-buckets and test-connection commands

use anyhow::Context as _;
use clap::Args;
use serde::Serialize;

use super::Session;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Arguments for the test-connection command
#[derive(Args, Debug)]
pub struct TestConnectionArgs {
    /// Bucket to check
    pub bucket: String,
}

#[derive(Serialize)]
struct ConnectionOutput<'a> {
    bucket: &'a str,
    reachable: bool,
}

/// List all buckets visible to the credentials
pub async fn list(session: &Session, formatter: &Formatter) -> anyhow::Result<ExitCode> {
    let handler = session.object_store().await?;
    let buckets = handler
        .list_buckets()
        .await
        .context("Failed to list buckets")?;

    if formatter.is_json() {
        formatter.json(&buckets);
    } else if buckets.is_empty() {
        formatter.println("No buckets found.");
    } else {
        for bucket in &buckets {
            formatter.println(bucket);
        }
    }
    Ok(ExitCode::Success)
}

pub async fn test_connection(
    args: TestConnectionArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.object_store().await?;
    let spinner = ProgressBar::spinner(
        formatter.config(),
        &format!("Connecting to '{}'...", args.bucket),
    );
    let result = handler.test_connection(Some(&args.bucket)).await;
    spinner.finish_and_clear();
    result.with_context(|| format!("Connection to bucket '{}' failed", args.bucket))?;

    if formatter.is_json() {
        formatter.json(&ConnectionOutput {
            bucket: &args.bucket,
            reachable: true,
        });
    } else {
        formatter.success(&format!("Bucket '{}' is reachable", args.bucket));
    }
    Ok(ExitCode::Success)
}
