//! Administration subcommands
//!
//! Each command runs one administration operation against an open pool and
//! returns the text to print on stdout. Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use credential_pool::{AccountId, AccountUpdate, NewAccount, Pool, parse_import, split_env_secrets};
use serde_json::json;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show pool health and per-account counters (secrets are never printed)
    Status,
    /// Add an account
    Add {
        /// Credential string (e.g. the full cookie header)
        secret: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        remark: String,
        /// Seconds between two uses of this account (pool default if omitted)
        #[arg(long)]
        min_interval: Option<u64>,
        /// Uses allowed per quota day (pool default if omitted)
        #[arg(long)]
        daily_limit: Option<u32>,
    },
    /// Delete an account permanently
    Remove { id: AccountId },
    /// Re-enable an account and clear its failure streak and cooldown
    Enable { id: AccountId },
    /// Disable an account until it is re-enabled
    Disable { id: AccountId },
    /// Re-enable and forgive failures, cooldown and today's usage
    Reset {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<AccountId>,
        /// Reset every account
        #[arg(long)]
        all: bool,
    },
    /// Edit an account's labels
    Rename {
        id: AccountId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        remark: Option<String>,
    },
    /// Change limits for one account, or for every account without --id
    SetLimits {
        #[arg(long)]
        id: Option<AccountId>,
        #[arg(long)]
        min_interval: Option<u64>,
        #[arg(long)]
        daily_limit: Option<u32>,
    },
    /// Add accounts from a file of `secret`, `name|secret` or `name|secret|remark` lines
    Import { file: PathBuf },
    /// Add accounts from an environment variable holding blank-line separated secrets
    ImportEnv {
        #[arg(long, default_value = "POOL_SECRETS")]
        var: String,
    },
}

/// Run one command. Returns what should be printed on stdout.
pub async fn execute(pool: &Pool, command: Command) -> Result<String> {
    match command {
        Command::Status => {
            let summary = pool.summary().await;
            Ok(serde_json::to_string_pretty(&summary)?)
        }
        Command::Add {
            secret,
            name,
            remark,
            min_interval,
            daily_limit,
        } => {
            let mut new = NewAccount::new(secret).remark(remark);
            new.name = name;
            new.min_interval_secs = min_interval;
            new.daily_limit = daily_limit;
            let id = pool.add_account(new).await?;
            Ok(json!({ "added": id }).to_string())
        }
        Command::Remove { id } => {
            pool.remove_account(id).await?;
            Ok(json!({ "removed": id }).to_string())
        }
        Command::Enable { id } => {
            pool.enable(id).await?;
            Ok(json!({ "enabled": id }).to_string())
        }
        Command::Disable { id } => {
            pool.disable(id).await?;
            Ok(json!({ "disabled": id }).to_string())
        }
        Command::Reset { id: Some(id), .. } => {
            pool.reset(id).await?;
            Ok(json!({ "reset": [id] }).to_string())
        }
        Command::Reset { id: None, all } => {
            if !all {
                bail!("reset needs an account id or --all");
            }
            let count = pool.reset_all().await?;
            Ok(json!({ "reset_count": count }).to_string())
        }
        Command::Rename { id, name, remark } => {
            if name.is_none() && remark.is_none() {
                bail!("rename needs --name and/or --remark");
            }
            let update = AccountUpdate {
                name,
                remark,
                ..AccountUpdate::default()
            };
            pool.update_account(id, update).await?;
            Ok(json!({ "updated": id }).to_string())
        }
        Command::SetLimits {
            id,
            min_interval,
            daily_limit,
        } => {
            if min_interval.is_none() && daily_limit.is_none() {
                bail!("set-limits needs --min-interval and/or --daily-limit");
            }
            match id {
                Some(id) => {
                    let update = AccountUpdate {
                        min_interval_secs: min_interval,
                        daily_limit,
                        ..AccountUpdate::default()
                    };
                    pool.update_account(id, update).await?;
                    Ok(json!({ "updated": [id] }).to_string())
                }
                None => {
                    let count = pool.update_all_limits(min_interval, daily_limit).await?;
                    Ok(json!({ "updated_count": count }).to_string())
                }
            }
        }
        Command::Import { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read import file {}", file.display()))?;
            let entries = parse_import(&text);
            info!(file = %file.display(), entries = entries.len(), "importing accounts");
            let report = pool.import(entries).await?;
            Ok(json!({ "added": report.added, "skipped": report.skipped }).to_string())
        }
        Command::ImportEnv { var } => {
            let value = std::env::var(&var).map_err(|e| common::Error::Env {
                var: var.clone(),
                reason: e.to_string(),
            })?;
            let entries = split_env_secrets(&value);
            info!(var = %var, entries = entries.len(), "importing accounts from environment");
            let report = pool.import(entries).await?;
            Ok(json!({ "added": report.added, "skipped": report.skipped }).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credential_pool::{ManualClock, MemoryStore, PoolSettings};
    use std::sync::Arc;

    async fn test_pool() -> Pool {
        Pool::open(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_760_000_000_000)),
            PoolSettings::default(),
        )
        .await
        .unwrap()
    }

    fn add(secret: &str) -> Command {
        Command::Add {
            secret: secret.into(),
            name: None,
            remark: String::new(),
            min_interval: None,
            daily_limit: None,
        }
    }

    #[tokio::test]
    async fn add_then_status_hides_secret() {
        let pool = test_pool().await;
        let out = execute(&pool, add("sid=very-secret")).await.unwrap();
        assert_eq!(out, r#"{"added":1}"#);

        let status = execute(&pool, Command::Status).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(parsed["status"], "healthy");
        assert_eq!(parsed["total"], 1);
        assert_eq!(parsed["accounts"][0]["name"], "account-1");
        assert!(!status.contains("very-secret"), "status leaked secret: {status}");
    }

    #[tokio::test]
    async fn disable_enable_and_reset_all() {
        let pool = test_pool().await;
        execute(&pool, add("a=1")).await.unwrap();
        execute(&pool, add("b=2")).await.unwrap();

        execute(&pool, Command::Disable { id: AccountId(1) }).await.unwrap();
        assert_eq!(pool.summary().await.disabled, 1);

        execute(&pool, Command::Enable { id: AccountId(1) }).await.unwrap();
        assert_eq!(pool.summary().await.disabled, 0);

        execute(&pool, Command::Disable { id: AccountId(2) }).await.unwrap();
        let out = execute(&pool, Command::Reset { id: None, all: true }).await.unwrap();
        assert_eq!(out, r#"{"reset_count":2}"#);
        assert_eq!(pool.summary().await.active, 2);
    }

    #[tokio::test]
    async fn reset_without_target_is_an_error() {
        let pool = test_pool().await;
        assert!(execute(&pool, Command::Reset { id: None, all: false }).await.is_err());
    }

    #[tokio::test]
    async fn set_limits_for_all_and_one() {
        let pool = test_pool().await;
        execute(&pool, add("a=1")).await.unwrap();
        execute(&pool, add("b=2")).await.unwrap();

        let out = execute(
            &pool,
            Command::SetLimits {
                id: None,
                min_interval: Some(1),
                daily_limit: Some(40),
            },
        )
        .await
        .unwrap();
        assert_eq!(out, r#"{"updated_count":2}"#);

        execute(
            &pool,
            Command::SetLimits {
                id: Some(AccountId(2)),
                min_interval: None,
                daily_limit: Some(7),
            },
        )
        .await
        .unwrap();

        let state = pool.snapshot().await;
        assert_eq!(state.accounts[0].daily_limit, 40);
        assert_eq!(state.accounts[1].daily_limit, 7);
        assert_eq!(state.accounts[1].min_interval_secs, 1);

        let empty = Command::SetLimits {
            id: None,
            min_interval: None,
            daily_limit: None,
        };
        assert!(execute(&pool, empty).await.is_err());
    }

    #[tokio::test]
    async fn rename_updates_labels() {
        let pool = test_pool().await;
        execute(&pool, add("a=1")).await.unwrap();
        execute(
            &pool,
            Command::Rename {
                id: AccountId(1),
                name: Some("primary".into()),
                remark: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(pool.snapshot().await.accounts[0].name, "primary");
    }

    #[tokio::test]
    async fn import_file_reports_added_and_skipped() {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("accounts.txt");
        std::fs::write(&file, "# accounts\nmain|a=1|day shift\nb=2\nb=2\n").unwrap();

        let out = execute(&pool, Command::Import { file }).await.unwrap();
        assert_eq!(out, r#"{"added":[1,2],"skipped":1}"#);
        assert_eq!(pool.snapshot().await.accounts[0].remark, "day shift");
    }

    #[tokio::test]
    async fn import_missing_file_is_an_error() {
        let pool = test_pool().await;
        let err = execute(
            &pool,
            Command::Import {
                file: PathBuf::from("/nonexistent/accounts.txt"),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to read import file"), "got: {err}");
    }

    #[tokio::test]
    async fn import_env_requires_variable() {
        let pool = test_pool().await;
        let err = execute(
            &pool,
            Command::ImportEnv {
                var: "POOLCTL_TEST_UNSET_VARIABLE".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("POOLCTL_TEST_UNSET_VARIABLE"), "got: {err}");
    }

    #[tokio::test]
    async fn unknown_id_surfaces_not_found() {
        let pool = test_pool().await;
        let err = execute(&pool, Command::Remove { id: AccountId(9) }).await.unwrap_err();
        assert!(err.to_string().contains("account not found: 9"), "got: {err}");
    }
}
