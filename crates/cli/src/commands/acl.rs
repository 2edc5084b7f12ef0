//! get-acl and set-acl commands

use anyhow::Context as _;
use clap::Args;

use iris_core::{AccessControlList, Permission};

use super::Session;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Arguments for the get-acl command
#[derive(Args, Debug)]
pub struct GetAclArgs {
    pub bucket: String,

    /// Show the ACL of this object instead of the bucket
    #[arg(long)]
    pub key: Option<String>,
}

/// Arguments for the set-acl command
#[derive(Args, Debug)]
pub struct SetAclArgs {
    pub bucket: String,

    /// Canonical user id to grant to
    pub principal: String,

    /// FULL_CONTROL, WRITE, WRITE_ACP, READ or READ_ACP
    pub permission: Permission,

    /// Apply to this object instead of the bucket
    #[arg(long)]
    pub key: Option<String>,
}

pub async fn get(
    args: GetAclArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let handler = session.mounted(&args.bucket).await?;
    let acl = match &args.key {
        Some(key) => handler.get_object_acl(key).await,
        None => handler.get_bucket_acl().await,
    }
    .context("Failed to read ACL")?;

    if formatter.is_json() {
        formatter.json(&acl);
    } else {
        if let Some(owner) = &acl.owner_id {
            formatter.println(&format!("Owner: {owner}"));
        }
        formatter.table(&["GRANTEE", "PERMISSION"], grant_rows(&acl));
    }
    Ok(ExitCode::Success)
}

pub async fn set(
    args: SetAclArgs,
    session: &Session,
    formatter: &Formatter,
) -> anyhow::Result<ExitCode> {
    let permission = args.permission.as_str();
    let handler = session.mounted(&args.bucket).await?;
    let target = match &args.key {
        Some(key) => {
            handler
                .set_object_acl(key, &args.principal, permission)
                .await
                .context("Failed to update object ACL")?;
            format!("{}/{key}", args.bucket)
        }
        None => {
            handler
                .set_bucket_acl(&args.principal, permission)
                .await
                .context("Failed to update bucket ACL")?;
            args.bucket.clone()
        }
    };

    if formatter.is_json() {
        formatter.json(&serde_json::json!({
            "target": target,
            "principal": args.principal,
            "permission": permission,
        }));
    } else {
        formatter.success(&format!(
            "Granted {permission} on {target} to {}",
            args.principal
        ));
    }
    Ok(ExitCode::Success)
}

fn grant_rows(acl: &AccessControlList) -> Vec<Vec<String>> {
    acl.grants
        .iter()
        .map(|grant| {
            let grantee = match &grant.grantee_display_name {
                Some(name) => format!("{name} ({})", grant.grantee_id),
                None => grant.grantee_id.clone(),
            };
            vec![grantee, grant.permission.to_string()]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use iris_core::Grant;

    #[test]
    fn test_permission_parsed_by_clap() {
        let cli = Cli::try_parse_from(["iris", "creds.json", "set-acl", "runs", "abc123", "WRITE_ACP"])
            .unwrap();
        match cli.command {
            Commands::SetAcl(args) => assert_eq!(args.permission, Permission::WriteAcp),
            other => panic!("unexpected command {other:?}"),
        }

        let err = Cli::try_parse_from(["iris", "creds.json", "set-acl", "runs", "abc123", "OWNER"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_grant_rows() {
        let mut named = Grant::new("abc123", Permission::FullControl);
        named.grantee_display_name = Some("lab-admin".into());
        let acl = AccessControlList {
            owner_id: Some("abc123".into()),
            grants: vec![named, Grant::new("def456", Permission::Read)],
        };

        insta::assert_json_snapshot!(grant_rows(&acl), @r#"
        [
          [
            "lab-admin (abc123)",
            "FULL_CONTROL"
          ],
          [
            "def456",
            "READ"
          ]
        ]
        "#);
    }
}
