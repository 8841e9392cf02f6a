//! Bulk account import
//!
//! Import files hold one account per line in one of three shapes:
//!
//! ```text
//! secret
//! name|secret
//! name|secret|remark
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Environment variables
//! carry several secrets separated by blank lines.

use crate::account::{AccountId, NewAccount};

/// One parsed import line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub secret: String,
    pub name: Option<String>,
    pub remark: String,
}

impl ImportEntry {
    pub fn into_new_account(self) -> NewAccount {
        NewAccount {
            secret: self.secret,
            name: self.name,
            remark: self.remark,
            min_interval_secs: None,
            daily_limit: None,
        }
    }
}

/// Result of `Pool::import`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: Vec<AccountId>,
    pub skipped: usize,
}

/// Parse an import file. Entries are not validated here; the pool rejects
/// empty or duplicate secrets when adding them.
pub fn parse_import(text: &str) -> Vec<ImportEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut parts = line.splitn(3, '|').map(str::trim);
            let first = parts.next().unwrap_or_default();
            match (parts.next(), parts.next()) {
                (None, _) => ImportEntry {
                    secret: first.to_string(),
                    name: None,
                    remark: String::new(),
                },
                (Some(secret), remark) => ImportEntry {
                    secret: secret.to_string(),
                    name: Some(first.to_string()).filter(|n| !n.is_empty()),
                    remark: remark.unwrap_or_default().to_string(),
                },
            }
        })
        .collect()
}

/// Split an environment value holding several secrets separated by blank lines.
pub fn split_env_secrets(value: &str) -> Vec<ImportEntry> {
    let normalized = value.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, secret)| ImportEntry {
            secret: secret.to_string(),
            name: Some(format!("env-{}", i + 1)),
            remark: String::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_shapes() {
        let entries = parse_import("a=1; b=2\nmain|c=3\nspare | d=4 | weekend only\n");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].secret, "a=1; b=2");
        assert_eq!(entries[0].name, None);

        assert_eq!(entries[1].name.as_deref(), Some("main"));
        assert_eq!(entries[1].secret, "c=3");
        assert_eq!(entries[1].remark, "");

        assert_eq!(entries[2].name.as_deref(), Some("spare"));
        assert_eq!(entries[2].secret, "d=4");
        assert_eq!(entries[2].remark, "weekend only");
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let entries = parse_import("# header\n\n   \nx=1\n  # indented comment\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].secret, "x=1");
    }

    #[test]
    fn remark_keeps_extra_pipes() {
        let entries = parse_import("n|s|left|right");
        assert_eq!(entries[0].remark, "left|right");
    }

    #[test]
    fn empty_name_becomes_none() {
        let entries = parse_import("|s=1");
        assert_eq!(entries[0].name, None);
        assert_eq!(entries[0].secret, "s=1");
    }

    #[test]
    fn env_value_splits_on_blank_lines() {
        let entries = split_env_secrets("a=1; b=2\n\nc=3\r\n\r\n\n\nd=4\n");
        let secrets: Vec<_> = entries.iter().map(|e| e.secret.as_str()).collect();
        assert_eq!(secrets, vec!["a=1; b=2", "c=3", "d=4"]);
        assert_eq!(entries[2].name.as_deref(), Some("env-3"));
    }

    #[test]
    fn entry_converts_without_limits() {
        let new = parse_import("n|s|r").remove(0).into_new_account();
        assert_eq!(new.secret, "s");
        assert_eq!(new.name.as_deref(), Some("n"));
        assert_eq!(new.min_interval_secs, None);
        assert_eq!(new.daily_limit, None);
    }
}
