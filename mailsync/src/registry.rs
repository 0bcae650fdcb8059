//! # Registry
//!
//! Module dedicated to the registry of stores and channels. The
//! registry owns every store and channel configuration; channels
//! reference their stores by [`StoreId`], a stable index into the
//! registry.

use std::{result, sync::Arc};

use thiserror::Error;
use tracing::debug;

use crate::{
    config::{ChannelConfig, Config},
    store::StoreConfig,
};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot register store {0}: name already taken")]
    DuplicateStoreError(String),
    #[error("cannot register channel {0}: name already taken")]
    DuplicateChannelError(String),
    #[error("cannot register channel {0}: unknown store {1}")]
    UnknownStoreError(String, String),
    #[error("cannot find store #{0} in registry")]
    StoreNotFoundError(usize),
}

/// The stable identifier of a store in a registry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StoreId(usize);

/// The stable identifier of a channel in a registry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(usize);

/// A registered channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelEntry {
    pub config: ChannelConfig,
    pub master: StoreId,
    pub slave: StoreId,
}

/// The registry of stores and channels.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    stores: Vec<Arc<StoreConfig>>,
    channels: Vec<ChannelEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every store then every channel of the given config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        for store in &config.stores {
            registry.add_store(store.clone())?;
        }

        for channel in &config.channels {
            registry.add_channel(channel.clone())?;
        }

        Ok(registry)
    }

    pub fn add_store(&mut self, config: StoreConfig) -> Result<StoreId> {
        if self.find_store(&config.name).is_some() {
            return Err(Error::DuplicateStoreError(config.name));
        }

        debug!(store = %config.name, "registering store");
        self.stores.push(Arc::new(config));
        Ok(StoreId(self.stores.len() - 1))
    }

    pub fn add_channel(&mut self, config: ChannelConfig) -> Result<ChannelId> {
        if self.find_channel(&config.name).is_some() {
            return Err(Error::DuplicateChannelError(config.name));
        }

        let find = |name: &str| {
            self.find_store(name)
                .ok_or_else(|| Error::UnknownStoreError(config.name.clone(), name.to_owned()))
        };

        let master = find(&config.master)?;
        let slave = find(&config.slave)?;

        debug!(channel = %config.name, "registering channel");
        self.channels.push(ChannelEntry {
            config,
            master,
            slave,
        });
        Ok(ChannelId(self.channels.len() - 1))
    }

    pub fn find_store(&self, name: &str) -> Option<StoreId> {
        self.stores
            .iter()
            .position(|store| store.name == name)
            .map(StoreId)
    }

    pub fn find_channel(&self, name: &str) -> Option<ChannelId> {
        self.channels
            .iter()
            .position(|channel| channel.config.name == name)
            .map(ChannelId)
    }

    pub fn store(&self, id: StoreId) -> Result<&Arc<StoreConfig>> {
        self.stores.get(id.0).ok_or(Error::StoreNotFoundError(id.0))
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelEntry> {
        self.channels.get(id.0)
    }

    pub fn stores(&self) -> impl Iterator<Item = (StoreId, &Arc<StoreConfig>)> {
        self.stores
            .iter()
            .enumerate()
            .map(|(i, store)| (StoreId(i), store))
    }

    /// Iterates over channels, in registration order.
    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &ChannelEntry)> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, channel)| (ChannelId(i), channel))
    }
}
