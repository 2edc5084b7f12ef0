//! Object listing, search and delete commands

use anyhow::Context as _;
use clap::Args;
use futures::TryStreamExt;
use serde::Serialize;

use iris_core::{DeleteReport, ObjectEntry};

use super::Session;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Arguments for the list-objects command
#[derive(Args, Debug)]
pub struct ListObjectsArgs {
    /// Bucket to list
    pub bucket: String,

    /// Print object keys only, without size or timestamps
    #[arg(long)]
    pub name_only: bool,
}

/// Arguments for the simple-search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Bucket to search
    pub bucket: String,

    /// Text the object key must contain
    pub text: String,

    /// Match case exactly
    #[arg(long)]
    pub case_sensitive: bool,
}

/// Arguments for the delete-object command
#[derive(Args, Debug)]
pub struct DeleteObjectArgs {
    pub bucket: String,

    /// Key of the object to delete
    pub key: String,
}

/// Arguments for the delete-folder command
#[derive(Args, Debug)]
pub struct DeleteFolderArgs {
    pub bucket: String,

    /// Folder to delete, with or without the trailing '/'
    pub folder: String,
}

#[derive(Serialize)]
struct DeleteOutput<'a> {
    deleted: &'a [String],
    failed: Vec<DeleteFailure<'a>>,
}

#[derive(Serialize)]
struct DeleteFailure<'a> {
    key: &'a str,
    error: String,
}

pub async fn list(
    args: ListObjectsArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;
    let entries = handler.list_objects(!args.name_only)?;
    futures::pin_mut!(entries);

    // Keys stream straight to stdout; the table needs every row first.
    if args.name_only && !formatter.is_json() {
        while let Some(entry) = entries.try_next().await.context("Listing failed")? {
            formatter.println(&entry.key);
        }
        return Ok(ExitCode::Success);
    }

    let entries: Vec<ObjectEntry> = entries.try_collect().await.context("Listing failed")?;
    if formatter.is_json() {
        if args.name_only {
            let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
            formatter.json(&keys);
        } else {
            formatter.json(&entries);
        }
    } else if entries.is_empty() {
        formatter.println(&format!("Bucket '{}' is empty.", args.bucket));
    } else {
        formatter.table(&["KEY", "SIZE", "LAST MODIFIED"], object_rows(&entries));
    }
    Ok(ExitCode::Success)
}

fn object_rows(entries: &[ObjectEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|entry| {
            let (size, modified) = match &entry.info {
                Some(info) => (
                    info.size_human.clone(),
                    info.last_modified
                        .map(|ts| ts.strftime("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                ),
                None => (String::new(), String::new()),
            };
            vec![entry.key.clone(), size, modified]
        })
        .collect()
}

pub async fn search(
    args: SearchArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;
    let keys = handler
        .search_objects(&args.text, args.case_sensitive)
        .await
        .context("Search failed")?;

    if formatter.is_json() {
        formatter.json(&keys);
    } else if keys.is_empty() {
        formatter.println(&format!("No objects match '{}'.", args.text));
    } else {
        for key in &keys {
            formatter.println(key);
        }
    }
    Ok(ExitCode::Success)
}

pub async fn delete_object(
    args: DeleteObjectArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;
    handler
        .delete_object(&args.key)
        .await
        .with_context(|| format!("Failed to delete '{}'", args.key))?;

    if formatter.is_json() {
        formatter.json(&serde_json::json!({ "deleted": [args.key] }));
    } else {
        formatter.success(&format!("Deleted '{}'", args.key));
    }
    Ok(ExitCode::Success)
}

pub async fn delete_folder(
    args: DeleteFolderArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;
    let report = handler
        .delete_folder(&args.folder)
        .await
        .with_context(|| format!("Failed to delete folder '{}'", args.folder))?;

    Ok(print_delete_report(&report, formatter))
}

fn print_delete_report(report: &DeleteReport, formatter: &Formatter) -> ExitCode {
    if formatter.is_json() {
        formatter.json(&DeleteOutput {
            deleted: &report.deleted,
            failed: report
                .failed
                .iter()
                .map(|(key, error)| DeleteFailure {
                    key,
                    error: error.to_string(),
                })
                .collect(),
        });
    } else {
        for (key, error) in &report.failed {
            formatter.error(&format!("{key}: {error}"));
        }
        formatter.success(&format!("Deleted {} object(s)", report.deleted.len()));
    }

    report
        .failed
        .first()
        .map_or(ExitCode::Success, |(_, error)| ExitCode::from_error(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_core::{Error, ObjectInfo};

    #[test]
    fn test_object_rows() {
        let mut info = ObjectInfo::new("run1/reads.fastq", 2048);
        info.last_modified = Some("2024-03-01T12:30:00Z".parse().unwrap());
        let entries = vec![
            ObjectEntry {
                key: info.key.clone(),
                info: Some(info),
            },
            ObjectEntry {
                key: "run1/".into(),
                info: None,
            },
        ];

        let rows = object_rows(&entries);
        insta::assert_json_snapshot!(rows, @r#"
        [
          [
            "run1/reads.fastq",
            "2 KiB",
            "2024-03-01 12:30:00"
          ],
          [
            "run1/",
            "",
            ""
          ]
        ]
        "#);
    }

    #[test]
    fn test_delete_report_exit_code() {
        let formatter = Formatter::new(crate::output::OutputConfig {
            quiet: true,
            ..Default::default()
        });
        let report = DeleteReport {
            deleted: vec!["a".into()],
            failed: vec![("b".into(), Error::AccessDenied("b".into()))],
        };
        assert_eq!(print_delete_report(&report, &formatter), ExitCode::AuthError);
        assert_eq!(
            print_delete_report(&DeleteReport::default(), &formatter),
            ExitCode::Success
        );
    }
}
