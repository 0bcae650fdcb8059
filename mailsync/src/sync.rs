//! # Synchronization
//!
//! Module dedicated to the synchronization of every channel of a
//! config. The main structure of this module is [`SyncBuilder`].

use std::{result, sync::Arc};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    channel::{ChannelSync, ChannelSyncReport},
    config::Config,
    driver::{self, DriverBuilder},
    ops::Operations,
    registry::{ChannelEntry, Registry},
    state::{StateFile, SyncState},
    Result,
};

/// Errors related to synchronization.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build driver of store {0}")]
    BuildDriverError(String, #[source] driver::Error),
}

/// The synchronization report.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// The report of every synchronized channel, or the error that
    /// aborted it.
    pub channels: Vec<(String, result::Result<ChannelSyncReport, crate::Error>)>,
}

/// The synchronization builder.
#[derive(Clone)]
pub struct SyncBuilder {
    config: Arc<Config>,
    drivers: Arc<dyn DriverBuilder>,
    state_file: Option<StateFile>,
    cli_ops: Operations,
    channels: Option<Vec<String>>,
    dry_run: Option<bool>,
}

impl SyncBuilder {
    pub fn new(config: Arc<Config>, drivers: Arc<dyn DriverBuilder>) -> Self {
        Self {
            config,
            drivers,
            state_file: None,
            cli_ops: Operations::empty(),
            channels: None,
            dry_run: None,
        }
    }

    pub fn set_some_state_file(&mut self, state_file: Option<StateFile>) {
        self.state_file = state_file;
    }

    pub fn with_state_file(mut self, state_file: StateFile) -> Self {
        self.set_some_state_file(Some(state_file));
        self
    }

    /// Sets the directive layer given on the command line.
    pub fn with_cli_ops(mut self, ops: Operations) -> Self {
        self.cli_ops = ops;
        self
    }

    /// Restricts the synchronization to the given channels.
    pub fn with_channels(mut self, channels: impl IntoIterator<Item = impl ToString>) -> Self {
        self.channels = Some(channels.into_iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.unwrap_or_default()
    }

    fn is_selected(&self, name: &str) -> bool {
        match &self.channels {
            Some(channels) => channels.iter().any(|channel| channel == name),
            None => true,
        }
    }

    /// Synchronizes the selected channels one after the other.
    ///
    /// The state file is locked for the whole run, and saved after
    /// every channel. A failing channel does not prevent the next
    /// ones from being synchronized.
    pub async fn sync(self) -> Result<SyncReport> {
        let registry = Registry::from_config(&self.config)?;
        let state_file = match &self.state_file {
            Some(state_file) => state_file.clone(),
            None => StateFile::try_default()?,
        };

        let lock = state_file.lock()?;
        let result = self.sync_channels(&registry, &state_file).await;

        let unlocked = lock.unlock();
        let report = result?;
        unlocked?;

        Ok(report)
    }

    async fn sync_channels(
        &self,
        registry: &Registry,
        state_file: &StateFile,
    ) -> Result<SyncReport> {
        let (mut state, _) = state_file.load_or_init().await?;
        let mut report = SyncReport::default();

        for (_, entry) in registry.channels() {
            let name = entry.config.name.clone();

            if !self.is_selected(&name) {
                debug!(channel = %name, "skipping unselected channel");
                continue;
            }

            let result = self.sync_channel(registry, entry, &mut state).await;

            if let Err(err) = &result {
                warn!(channel = %name, "{err}");
                debug!("{err:?}");
            }

            report.channels.push((name, result));

            if !self.is_dry_run() {
                state_file.save(&mut state).await?;
            }
        }

        Ok(report)
    }

    async fn sync_channel(
        &self,
        registry: &Registry,
        entry: &ChannelEntry,
        state: &mut SyncState,
    ) -> Result<ChannelSyncReport> {
        let name = &entry.config.name;
        let ops = self.config.resolve_channel_ops(&entry.config, self.cli_ops)?;

        let master = registry.store(entry.master)?.clone();
        let slave = registry.store(entry.slave)?.clone();

        let mut master_driver = self
            .drivers
            .build(&master)
            .await
            .map_err(|err| Error::BuildDriverError(master.name.clone(), err))?;
        let mut slave_driver = self
            .drivers
            .build(&slave)
            .await
            .map_err(|err| Error::BuildDriverError(slave.name.clone(), err))?;

        let channel = ChannelSync::new(name, master, slave, ops)
            .with_some_mailbox(entry.config.mailbox.as_ref())
            .with_dry_run(self.is_dry_run());

        let report = channel
            .sync(
                master_driver.as_mut(),
                slave_driver.as_mut(),
                state.channel_mut(name),
            )
            .await?;

        Ok(report)
    }
}
