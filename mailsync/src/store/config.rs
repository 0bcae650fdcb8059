//! # Store config
//!
//! Module dedicated to the configuration of one side of a channel.

use std::{path::PathBuf, result};

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// The default mailbox name, used when no mailbox is given or when
/// the mailbox matches the inbox alias of the store.
pub const INBOX: &str = "INBOX";

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot parse invalid size {0}")]
    ParseSizeError(String),
    #[error("cannot parse invalid boolean value {0}")]
    ParseBoolError(String),
}

/// The store configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// The name of the store, referenced by channels.
    pub name: String,

    /// The identifier of the driver in charge of the store, for
    /// example `imap` or `maildir`.
    #[serde(default)]
    pub driver: Option<String>,

    /// The driver-specific location of the store.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// The mailbox deleted messages are moved to before being
    /// expunged. No trash means deleted messages are expunged
    /// straight away.
    #[serde(default)]
    pub trash: Option<String>,

    /// Only move to trash messages that were never synchronized.
    #[serde(default, deserialize_with = "bool_from_any")]
    pub trash_only_new: bool,

    /// Also move to this store trash the new messages deleted from
    /// the counterpart store before they could be synchronized.
    #[serde(default, deserialize_with = "bool_from_any")]
    pub trash_remote_new: bool,

    /// Messages bigger than this size (in bytes) are never appended
    /// to the store. Accepts `k`/`m` suffixes.
    #[serde(default, deserialize_with = "size_from_any")]
    pub max_size: Option<u64>,

    /// The mailbox name aliasing the inbox of the store.
    #[serde(default)]
    pub map_inbox: Option<String>,
}

impl StoreConfig {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_trash(mut self, trash: impl ToString) -> Self {
        self.trash = Some(trash.to_string());
        self
    }

    pub fn with_trash_only_new(mut self, only_new: bool) -> Self {
        self.trash_only_new = only_new;
        self
    }

    pub fn with_trash_remote_new(mut self, remote_new: bool) -> Self {
        self.trash_remote_new = remote_new;
        self
    }

    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_size = Some(size).filter(|size| *size > 0);
        self
    }

    pub fn with_map_inbox(mut self, alias: impl ToString) -> Self {
        self.map_inbox = Some(alias.to_string());
        self
    }

    pub fn has_trash(&self) -> bool {
        self.trash.is_some()
    }

    /// Whether deleted new messages of the counterpart store must be
    /// copied to the trash of this store.
    pub fn trashes_remote_new(&self) -> bool {
        self.trash.is_some() && self.trash_remote_new
    }

    /// Whether a message of the given size exceeds the maximum size
    /// of the store.
    pub fn exceeds_max_size(&self, size: u64) -> bool {
        matches!(self.max_size, Some(max) if size > max)
    }

    /// Resolves the mailbox name to open on this store.
    pub fn resolve_mailbox(&self, mailbox: Option<&str>) -> String {
        match mailbox {
            None => INBOX.to_owned(),
            Some(name) if self.map_inbox.as_deref() == Some(name) => INBOX.to_owned(),
            Some(name) => name.to_owned(),
        }
    }
}

/// Parses a size made of an integer followed by an optional `k` or
/// `m` multiplier and an optional `b` unit.
pub fn parse_size(size: &str) -> Result<u64> {
    let err = || Error::ParseSizeError(size.to_owned());

    let trimmed = size.trim();
    let digits = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (value, mut suffix) = trimmed.split_at(digits);
    let mut value: u64 = value.parse().map_err(|_| err())?;

    let mut chars = suffix.chars();
    match chars.next() {
        Some('k' | 'K') => {
            value = value.checked_mul(1024).ok_or_else(err)?;
            suffix = chars.as_str();
        }
        Some('m' | 'M') => {
            value = value.checked_mul(1024 * 1024).ok_or_else(err)?;
            suffix = chars.as_str();
        }
        _ => (),
    }

    match suffix {
        "" | "b" | "B" => Ok(value),
        _ => Err(err()),
    }
}

/// Parses a boolean written as `yes`/`no`, `true`/`false`,
/// `on`/`off` or `1`/`0`.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim() {
        v if ["yes", "true", "on"].iter().any(|t| v.eq_ignore_ascii_case(t)) => Ok(true),
        "1" => Ok(true),
        v if ["no", "false", "off"].iter().any(|f| v.eq_ignore_ascii_case(f)) => Ok(false),
        "0" => Ok(false),
        _ => Err(Error::ParseBoolError(value.to_owned())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnySize {
    Int(u64),
    Str(String),
}

fn size_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> result::Result<Option<u64>, D::Error> {
    let size = match Option::<AnySize>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(AnySize::Int(size)) => size,
        Some(AnySize::Str(size)) => parse_size(&size).map_err(de::Error::custom)?,
    };

    // a zero size means no limit
    Ok(Some(size).filter(|size| *size > 0))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyBool {
    Bool(bool),
    Int(i64),
    Str(String),
}

fn bool_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> result::Result<bool, D::Error> {
    match AnyBool::deserialize(deserializer)? {
        AnyBool::Bool(b) => Ok(b),
        AnyBool::Int(1) => Ok(true),
        AnyBool::Int(0) => Ok(false),
        AnyBool::Int(n) => Err(de::Error::custom(Error::ParseBoolError(n.to_string()))),
        AnyBool::Str(s) => parse_bool(&s).map_err(de::Error::custom),
    }
}

pub(crate) fn some_bool_from_any<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> result::Result<Option<bool>, D::Error> {
    match Option::<AnyBool>::deserialize(deserializer)? {
        None => Ok(None),
        Some(AnyBool::Bool(b)) => Ok(Some(b)),
        Some(AnyBool::Int(1)) => Ok(Some(true)),
        Some(AnyBool::Int(0)) => Ok(Some(false)),
        Some(AnyBool::Int(n)) => Err(de::Error::custom(Error::ParseBoolError(n.to_string()))),
        Some(AnyBool::Str(s)) => parse_bool(&s).map(Some).map_err(de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_size, StoreConfig, INBOX};

    #[test]
    fn parse_sizes() {
        assert_eq!(parse_size("1000").unwrap(), 1000);
        assert_eq!(parse_size("10k").unwrap(), 10 * 1024);
        assert_eq!(parse_size("10KB").unwrap(), 10 * 1024);
        assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("512b").unwrap(), 512);
        assert!(parse_size("").is_err());
        assert!(parse_size("10x").is_err());
        assert!(parse_size("10kk").is_err());
        assert!(parse_size("k").is_err());
    }

    #[test]
    fn parse_bools() {
        for t in ["yes", "TRUE", "On", "1"] {
            assert!(parse_bool(t).unwrap(), "{t}");
        }
        for f in ["no", "False", "OFF", "0"] {
            assert!(!parse_bool(f).unwrap(), "{f}");
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn resolve_mailbox() {
        let config = StoreConfig::new("remote").with_map_inbox("sms");
        assert_eq!(config.resolve_mailbox(None), INBOX);
        assert_eq!(config.resolve_mailbox(Some("sms")), INBOX);
        assert_eq!(config.resolve_mailbox(Some("calls")), "calls");
    }

    #[test]
    fn max_size() {
        let config = StoreConfig::new("remote").with_max_size(1000);
        assert!(!config.exceeds_max_size(1000));
        assert!(config.exceeds_max_size(1001));
        assert!(!StoreConfig::new("remote").with_max_size(0).exceeds_max_size(u64::MAX));
    }
}
