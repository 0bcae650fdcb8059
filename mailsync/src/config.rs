//! # Config
//!
//! Module dedicated to the configuration of stores and channels. The
//! main structure of this module is [`Config`].
//!
//! ```toml
//! sync = "all"
//! expunge = "yes"
//!
//! [[stores]]
//! name = "remote"
//! driver = "imap"
//! trash = "Trash"
//! trash-remote-new = true
//! max-size = "1M"
//!
//! [[stores]]
//! name = "local"
//! driver = "maildir"
//! path = "~/Mail"
//!
//! [[channels]]
//! name = "inbox"
//! master = "remote"
//! slave = "local"
//! sync = "pull new flags"
//! ```

use std::{fs, io, path::PathBuf, result};

use serde::{Deserialize, Serialize};
use shellexpand_utils::shellexpand_path;
use thiserror::Error;
use tracing::debug;

use crate::{
    ops::{self, Operations},
    store::{config::some_bool_from_any, StoreConfig},
};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read config file {1:?}")]
    ReadConfigError(#[source] io::Error, PathBuf),
    #[error("cannot parse config")]
    ParseConfigError(#[source] toml::de::Error),
    #[error("cannot parse sync directive of {0}")]
    ParseSyncDirectiveError(String, #[source] ops::Error),
    #[error("cannot resolve operations of channel {0}")]
    ResolveOperationsError(String, #[source] ops::Error),
}

/// The global configuration.
///
/// Directives given at this level act as defaults for channels that
/// do not give their own.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The default sync directive, for example `pull new flags`.
    #[serde(default)]
    pub sync: Option<String>,

    /// Whether deleted messages are expunged by default.
    #[serde(default, deserialize_with = "some_bool_from_any")]
    pub expunge: Option<bool>,

    /// Whether missing mailboxes are created by default.
    #[serde(default, deserialize_with = "some_bool_from_any")]
    pub create: Option<bool>,

    #[serde(default)]
    pub stores: Vec<StoreConfig>,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::ParseConfigError)
    }

    /// Reads the config from the given path. The path is first
    /// shell-expanded (`~`, environment variables).
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = shellexpand_path(path.into());
        debug!("reading config file {path:?}");

        let content =
            fs::read_to_string(&path).map_err(|err| Error::ReadConfigError(err, path.clone()))?;

        Self::from_toml_str(&content)
    }

    pub fn find_channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// Resolves the master and slave operations of the given channel.
    ///
    /// The command line layer, if any, is merged first, then the
    /// channel layer, whose missing directives are taken from the
    /// global ones.
    pub fn resolve_channel_ops(
        &self,
        channel: &ChannelConfig,
        cli: Operations,
    ) -> Result<(Operations, Operations)> {
        let layer = channel.layer(self)?;
        debug!(channel = %channel.name, %cli, %layer, "resolving operations");

        let (master_ops, slave_ops) = ops::resolve([cli, layer])
            .map_err(|err| Error::ResolveOperationsError(channel.name.clone(), err))?;

        debug!(master = %master_ops, slave = %slave_ops, "resolved operations");
        Ok((master_ops, slave_ops))
    }
}

/// The channel configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelConfig {
    pub name: String,

    /// The name of the master store.
    pub master: String,

    /// The name of the slave store.
    pub slave: String,

    /// The mailbox synchronized on both stores. Defaults to the
    /// inbox.
    #[serde(default)]
    pub mailbox: Option<String>,

    #[serde(default)]
    pub sync: Option<String>,

    #[serde(default, deserialize_with = "some_bool_from_any")]
    pub expunge: Option<bool>,

    #[serde(default, deserialize_with = "some_bool_from_any")]
    pub create: Option<bool>,
}

impl ChannelConfig {
    pub fn new(name: impl ToString, master: impl ToString, slave: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            master: master.to_string(),
            slave: slave.to_string(),
            ..Default::default()
        }
    }

    pub fn with_sync(mut self, sync: impl ToString) -> Self {
        self.sync = Some(sync.to_string());
        self
    }

    pub fn with_expunge(mut self, expunge: bool) -> Self {
        self.expunge = Some(expunge);
        self
    }

    /// Builds the directive layer of the channel, falling back to the
    /// global directives of the given config.
    pub fn layer(&self, config: &Config) -> Result<Operations> {
        layer(
            &self.name,
            self.sync.as_deref().or(config.sync.as_deref()),
            self.expunge.or(config.expunge),
            self.create.or(config.create),
        )
    }
}

/// Builds a directive layer from its raw directives.
pub fn layer(
    name: &str,
    sync: Option<&str>,
    expunge: Option<bool>,
    create: Option<bool>,
) -> Result<Operations> {
    let mut ops = match sync {
        Some(sync) => sync
            .parse()
            .map_err(|err| Error::ParseSyncDirectiveError(name.to_owned(), err))?,
        None => Operations::empty(),
    };

    if let Some(expunge) = expunge {
        ops |= Operations::expunge(expunge);
    }

    if let Some(create) = create {
        ops |= Operations::create(create);
    }

    Ok(ops)
}
