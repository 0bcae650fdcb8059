//! # Channel
//!
//! Module dedicated to channel synchronization. A channel binds a
//! mailbox of a master store to a mailbox of a slave store. The main
//! structure of this module is [`ChannelSync`].
//!
//! A synchronization pass opens both stores with the options derived
//! from the channel operations, builds a patch from the persisted
//! records and the listed messages, applies it hunk after hunk, then
//! expunges the stores when asked to.

pub mod hunk;
pub mod patch;
pub mod report;

use std::{result, sync::Arc};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    driver::{self, Driver},
    expunge::{self, ExpungeStatus},
    message::Uid,
    ops::Operations,
    options::{self, OpenOptions},
    record,
    side::Side,
    state::ChannelState,
    store::{Store, StoreConfig},
};

#[doc(inline)]
pub use self::{
    hunk::SyncHunk,
    patch::{Endpoint, SyncPatch},
    report::ChannelSyncReport,
};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open {0} store {1}")]
    OpenStoreError(Side, String, #[source] driver::Error),
    #[error("cannot prepare {0} store {1}")]
    PrepareStoreError(Side, String, #[source] driver::Error),
    #[error("cannot select mailbox {2} of {0} store {1}")]
    SelectMailboxError(Side, String, String, #[source] driver::Error),
    #[error("cannot synchronize channel {0}: uid validity of {1} store changed from {2} to {3}")]
    UidValidityError(String, Side, u32, u32),
    #[error("cannot set flags of {0} message {1}")]
    SetFlagsError(Side, Uid, #[source] driver::Error),
    #[error("cannot fetch {0} message {1}")]
    FetchMessageError(Side, Uid, #[source] driver::Error),
    #[error("cannot copy message {1} to {0} store")]
    StoreMessageError(Side, Uid, #[source] driver::Error),
    #[error("cannot apply hunk: {0} store is no longer usable")]
    StoreBadError(Side),

    #[error(transparent)]
    RecordError(#[from] record::Error),
}

impl Error {
    /// The side whose store the driver declared unusable, if any.
    pub fn bad_side(&self) -> Option<Side> {
        match self {
            Self::SetFlagsError(side, _, err)
            | Self::FetchMessageError(side, _, err)
            | Self::StoreMessageError(side, _, err)
                if err.is_store_bad() =>
            {
                Some(*side)
            }
            Self::StoreBadError(side) => Some(*side),
            _ => None,
        }
    }
}

/// The channel synchronizer.
#[derive(Clone, Debug)]
pub struct ChannelSync {
    name: String,
    mailbox: Option<String>,
    master: Arc<StoreConfig>,
    slave: Arc<StoreConfig>,
    master_ops: Operations,
    slave_ops: Operations,
    dry_run: Option<bool>,
}

impl ChannelSync {
    /// Creates a new channel synchronizer from the resolved master
    /// and slave operations.
    pub fn new(
        name: impl ToString,
        master: Arc<StoreConfig>,
        slave: Arc<StoreConfig>,
        (master_ops, slave_ops): (Operations, Operations),
    ) -> Self {
        Self {
            name: name.to_string(),
            mailbox: None,
            master,
            slave,
            master_ops,
            slave_ops,
            dry_run: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_some_mailbox(&mut self, mailbox: Option<impl ToString>) {
        self.mailbox = mailbox.map(|mailbox| mailbox.to_string());
    }

    pub fn with_some_mailbox(mut self, mailbox: Option<impl ToString>) -> Self {
        self.set_some_mailbox(mailbox);
        self
    }

    pub fn with_mailbox(self, mailbox: impl ToString) -> Self {
        self.with_some_mailbox(Some(mailbox))
    }

    pub fn set_some_dry_run(&mut self, dry_run: Option<bool>) {
        self.dry_run = dry_run;
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.set_some_dry_run(Some(dry_run));
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run.unwrap_or_default()
    }

    /// The operations applied to the given side.
    pub fn ops(&self, side: Side) -> Operations {
        match side {
            Side::Master => self.master_ops,
            Side::Slave => self.slave_ops,
        }
    }

    /// The options the master and slave stores are opened with.
    pub fn open_options(&self) -> (OpenOptions, OpenOptions) {
        options::derive(self.master_ops, self.slave_ops, &self.master, &self.slave)
    }

    /// Synchronizes the channel, using the given drivers for the
    /// master and the slave stores.
    ///
    /// Failures of single hunks do not abort the pass: they are
    /// collected in the report, and the channel state is kept
    /// consistent with the hunks that succeeded. Only failures
    /// happening before any change is made are returned as errors.
    ///
    /// The stores are expunged unless one of them went bad during the
    /// pass. A hunk failing otherwise leaves its record untouched, so
    /// the next pass retries it.
    pub async fn sync(
        &self,
        master_driver: &mut dyn Driver,
        slave_driver: &mut dyn Driver,
        state: &mut ChannelState,
    ) -> Result<ChannelSyncReport> {
        info!(channel = %self.name, "synchronizing channel");

        let (master_opts, slave_opts) = self.open_options();
        debug!(master = %master_opts, slave = %slave_opts, "derived open options");

        let master_config = self.master.clone();
        let mut master = self
            .open(Side::Master, master_driver, master_config, master_opts)
            .await?;

        let slave_config = self.slave.clone();
        let mut slave = match self
            .open(Side::Slave, slave_driver, slave_config, slave_opts)
            .await
        {
            Ok(slave) => slave,
            Err(err) => {
                master_driver.close_store(master).await;
                return Err(err);
            }
        };

        let report = self
            .sync_stores(master_driver, &mut master, slave_driver, &mut slave, state)
            .await;

        master_driver.close_store(master).await;
        slave_driver.close_store(slave).await;

        report
    }

    async fn open(
        &self,
        side: Side,
        driver: &mut dyn Driver,
        config: Arc<StoreConfig>,
        options: OpenOptions,
    ) -> Result<Store> {
        let name = config.name.clone();
        let mailbox = config.resolve_mailbox(self.mailbox.as_deref());

        debug!(store = %name, %mailbox, %options, "opening {side} store");

        let mut store = driver
            .open_store(config)
            .await
            .map_err(|err| Error::OpenStoreError(side, name.clone(), err))?;
        store.set_name(&mailbox);
        store.set_options(options);

        if let Err(err) = driver.prepare(&mut store, options).await {
            driver.close_store(store).await;
            return Err(Error::PrepareStoreError(side, name, err));
        }

        if let Err(err) = driver.select(&mut store).await {
            driver.close_store(store).await;
            return Err(Error::SelectMailboxError(side, name, mailbox, err));
        }

        debug!(store = %name, "{} messages listed", store.messages().len());
        store.dump();

        Ok(store)
    }

    fn check_uid_validity(
        &self,
        side: Side,
        store: &Store,
        known: &mut Option<u32>,
        has_records: bool,
    ) -> Result<()> {
        match (*known, store.uid_validity()) {
            (Some(known), Some(current)) if has_records && known != current => Err(
                Error::UidValidityError(self.name.clone(), side, known, current),
            ),
            (_, Some(current)) => {
                *known = Some(current);
                Ok(())
            }
            (_, None) => Ok(()),
        }
    }

    async fn sync_stores(
        &self,
        master_driver: &mut dyn Driver,
        master: &mut Store,
        slave_driver: &mut dyn Driver,
        slave: &mut Store,
        state: &mut ChannelState,
    ) -> Result<ChannelSyncReport> {
        let has_records = state.records.live().next().is_some();
        self.check_uid_validity(
            Side::Master,
            master,
            &mut state.master_uid_validity,
            has_records,
        )?;
        self.check_uid_validity(
            Side::Slave,
            slave,
            &mut state.slave_uid_validity,
            has_records,
        )?;

        state.records.check()?;

        // a dry run must leave the records untouched
        let mut dry_records;
        let records = if self.is_dry_run() {
            dry_records = state.records.clone();
            &mut dry_records
        } else {
            &mut state.records
        };

        {
            let mut master = Endpoint::new(&mut *master_driver, &mut *master);
            let mut slave = Endpoint::new(&mut *slave_driver, &mut *slave);
            patch::adopt_pending(&mut master, &mut slave, records).await?;
        }

        let patch = patch::build(self.master_ops, self.slave_ops, records, master, slave);
        debug!(channel = %self.name, "built patch of {} hunks", patch.len());

        let mut report = ChannelSyncReport::new(&self.name);

        if self.is_dry_run() {
            report.patch = patch.into_iter().map(|hunk| (hunk, None)).collect();
            return Ok(report);
        }

        let mut bad = None;

        {
            let mut master = Endpoint::new(&mut *master_driver, &mut *master);
            let mut slave = Endpoint::new(&mut *slave_driver, &mut *slave);

            for hunk in patch {
                if let Some(side) = bad {
                    report.patch.push((hunk, Some(Error::StoreBadError(side))));
                    continue;
                }

                debug!("{hunk}");

                match patch::apply(&hunk, &mut master, &mut slave, records).await {
                    Ok(()) => report.patch.push((hunk, None)),
                    Err(err) => {
                        warn!("{err}");
                        debug!("{err:?}");

                        if let Some(side) = err.bad_side() {
                            match side {
                                Side::Master => master.store.mark_bad(),
                                Side::Slave => slave.store.mark_bad(),
                            }
                            bad = Some(side);
                        }

                        report.patch.push((hunk, Some(err)));
                    }
                }
            }
        }

        if bad.is_none() && self.master_ops.contains(Operations::EXPUNGE) {
            let result = expunge::try_expunge(master_driver, master, slave_driver, slave).await;
            report.master_expunge = Some((ExpungeStatus::from(&result), result.err()));
        }

        if bad.is_none()
            && !master.is_bad()
            && !slave.is_bad()
            && self.slave_ops.contains(Operations::EXPUNGE)
        {
            let result = expunge::try_expunge(slave_driver, slave, master_driver, master).await;
            report.slave_expunge = Some((ExpungeStatus::from(&result), result.err()));
        }

        state.last_sync = Some(Local::now());

        Ok(report)
    }
}
