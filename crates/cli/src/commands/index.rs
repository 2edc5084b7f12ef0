//! list-indexes and lookup-index commands

use anyhow::Context as _;
use clap::Args;
use serde_json::Value;

use iris_core::IndexMetadata;

use super::Session;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Arguments for the lookup-index command
#[derive(Args, Debug)]
pub struct LookupIndexArgs {
    /// Exact index name
    pub name: String,
}

pub async fn list(session: &Session, formatter: &Formatter) -> anyhow::Result<ExitCode> {
    let handler = session.index()?;
    let indexes = handler
        .list_indexes()
        .await
        .context("Failed to list indexes")?;

    if formatter.is_json() {
        formatter.json(&indexes);
    } else if indexes.is_empty() {
        formatter.println("No indexes found.");
    } else {
        for index in &indexes {
            formatter.println(&index.name);
        }
    }
    Ok(ExitCode::Success)
}

pub async fn lookup(
    args: LookupIndexArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.index()?;
    let index = handler
        .lookup_index(&args.name)
        .await
        .with_context(|| format!("Failed to look up index '{}'", args.name))?;

    if formatter.is_json() {
        formatter.json(&index);
    } else {
        formatter.table(&["FIELD", "VALUE"], metadata_rows(&index));
    }
    Ok(ExitCode::Success)
}

/// `name` first, then the remaining fields sorted by field name
fn metadata_rows(index: &IndexMetadata) -> Vec<Vec<String>> {
    let mut fields: Vec<Vec<String>> = index
        .extra
        .iter()
        .map(|(field, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            vec![field.clone(), value]
        })
        .collect();
    fields.sort();

    let mut rows = vec![vec!["name".to_string(), index.name.clone()]];
    rows.extend(fields);
    rows
}
