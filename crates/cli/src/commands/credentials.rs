//! generate-credentials command
//!
//! Writes an all-empty credentials file for the user to fill in.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Args;

use iris_core::{Error, RawCredentials};

use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Arguments for the generate-credentials command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Folder to write the file into; created if missing
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// File name; anything after the first '.' is replaced by ".json"
    #[arg(long, default_value = "credentials")]
    pub name: String,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

pub fn execute(args: GenerateArgs, formatter: &Formatter) -> anyhow::Result<ExitCode> {
    let target = credentials_path(&args.path, &args.name);
    if target.exists() && !args.force {
        return Err(Error::Conflict(format!(
            "{} already exists; use --force to overwrite",
            target.display()
        ))
        .into());
    }

    std::fs::create_dir_all(&args.path)
        .with_context(|| format!("Failed to create {}", args.path.display()))?;
    let content = serde_json::to_string_pretty(&RawCredentials::template())?;
    std::fs::write(&target, content + "\n")
        .with_context(|| format!("Failed to write {}", target.display()))?;

    if formatter.is_json() {
        formatter.json(&serde_json::json!({ "path": target }));
    } else {
        formatter.success(&format!("Wrote credentials template to {}", target.display()));
    }
    Ok(ExitCode::Success)
}

fn credentials_path(folder: &Path, name: &str) -> PathBuf {
    let stem = name.split('.').next().unwrap_or_default();
    let stem = if stem.is_empty() { "credentials" } else { stem };
    folder.join(format!("{stem}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputConfig;

    fn quiet() -> Formatter {
        Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_credentials_path() {
        let folder = Path::new("/tmp/lab");
        assert_eq!(credentials_path(folder, "hcp.txt"), folder.join("hcp.json"));
        assert_eq!(credentials_path(folder, "a.b.c"), folder.join("a.json"));
        assert_eq!(credentials_path(folder, "lab"), folder.join("lab.json"));
        assert_eq!(credentials_path(folder, ".hidden"), folder.join("credentials.json"));
    }

    #[test]
    fn test_writes_template_into_new_folder() {
        let dir = tempfile::tempdir().unwrap();
        let args = GenerateArgs {
            path: dir.path().join("nested"),
            name: "lab.txt".into(),
            force: false,
        };
        assert_eq!(execute(args, &quiet()).unwrap(), ExitCode::Success);

        let content = std::fs::read_to_string(dir.path().join("nested/lab.json")).unwrap();
        insta::assert_snapshot!(content.trim_end(), @r#"
        {
          "hcp": {
            "endpoint": "",
            "aws_access_key_id": "",
            "aws_secret_access_key": ""
          },
          "hci": {
            "username": "",
            "password": "",
            "address": "",
            "auth_port": "",
            "api_port": ""
          }
        }
        "#);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lab.json"), "{}").unwrap();
        let args = GenerateArgs {
            path: dir.path().to_path_buf(),
            name: "lab".into(),
            force: false,
        };
        let err = execute(args, &quiet()).unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err), ExitCode::Conflict);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("lab.json")).unwrap(),
            "{}"
        );
    }
}
