//! # Feed
//!
//! Module dedicated to event feed backups. A [`MessageSource`]
//! enumerates events (phone calls, text messages, instant
//! messages…) already rendered as raw messages; a [`Backup`] appends
//! them one by one into a store and remembers, in the channel state,
//! the position of the last event stored.

use std::{result, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    driver::{self, Driver},
    flag::Flags,
    message::{MessageData, Uid},
    options::OpenOptions,
    state::{self, StateFile, SyncState},
    store::{Store, StoreConfig},
    AnyBoxedError, AnyResult,
};

/// The default number of events stored between two checkpoints.
pub const DEFAULT_CHECKPOINT: usize = 10;

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot fetch events from message source")]
    FetchEventsError(#[source] AnyBoxedError),
    #[error("cannot open store {0}")]
    OpenStoreError(String, #[source] driver::Error),
    #[error("cannot prepare store {0}")]
    PrepareStoreError(String, #[source] driver::Error),
    #[error("cannot append message to store {0}")]
    AppendMessageError(String, #[source] driver::Error),
    #[error("cannot append message: store {0} is no longer usable")]
    StoreBadError(String, #[source] driver::Error),
    #[error("cannot back up event {0}")]
    BackupEventError(String, #[source] Box<Error>),

    #[error(transparent)]
    StateError(#[from] state::Error),
}

/// An event of a message source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeedEvent {
    /// The identifier of the event, stable across runs.
    pub id: String,
    pub timestamp: DateTime<Local>,

    /// The event rendered as a raw message.
    pub data: Vec<u8>,
}

impl FeedEvent {
    pub fn new(id: impl ToString, timestamp: DateTime<Local>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.to_string(),
            timestamp,
            data: data.into(),
        }
    }
}

/// The message source.
#[async_trait]
pub trait MessageSource: Send {
    /// Lists the events that happened at or after the given
    /// position, in timestamp order. Events already backed up are
    /// filtered out by the backup.
    ///
    /// The correlation token of the installation is given so that
    /// rendered messages can reference each other across runs.
    async fn events(
        &mut self,
        token: &str,
        after: Option<DateTime<Local>>,
    ) -> AnyResult<Vec<FeedEvent>>;
}

/// Opens the given mailbox of a store for appending.
pub async fn open(
    driver: &mut dyn Driver,
    config: Arc<StoreConfig>,
    mailbox: Option<&str>,
) -> Result<Store> {
    let name = config.name.clone();
    let mailbox = config.resolve_mailbox(mailbox);
    let options = OpenOptions::SIZE | OpenOptions::CREATE | OpenOptions::FLAGS;

    let mut store = driver
        .open_store(config)
        .await
        .map_err(|err| Error::OpenStoreError(name.clone(), err))?;
    store.set_name(mailbox);
    store.set_options(options);

    if let Err(err) = driver.prepare(&mut store, options).await {
        driver.close_store(store).await;
        return Err(Error::PrepareStoreError(name, err));
    }

    Ok(store)
}

/// Appends a single raw message to the given store.
///
/// A store declared unusable by its driver is marked as bad.
pub async fn append(
    driver: &mut dyn Driver,
    store: &mut Store,
    data: impl Into<Vec<u8>>,
) -> Result<Option<Uid>> {
    let name = store.config().name.clone();
    let data = MessageData::new(data, Flags::empty());

    match driver.store_msg(store, &data, false).await {
        Ok(uid) => Ok(uid),
        Err(err) if err.is_store_bad() => {
            store.mark_bad();
            Err(Error::StoreBadError(name, err))
        }
        Err(err) => Err(Error::AppendMessageError(name, err)),
    }
}

/// The backup report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackupReport {
    /// Whether this was the first backup of the channel.
    pub first: bool,

    /// The number of events stored.
    pub stored: usize,

    /// The timestamp of the last event stored, if any.
    pub position: Option<DateTime<Local>>,
}

/// The event feed backup.
#[derive(Clone, Debug)]
pub struct Backup {
    channel: String,
    state_file: StateFile,
    checkpoint: usize,
}

impl Backup {
    pub fn new(channel: impl ToString, state_file: StateFile) -> Self {
        Self {
            channel: channel.to_string(),
            state_file,
            checkpoint: DEFAULT_CHECKPOINT,
        }
    }

    /// Sets the number of events stored between two saves of the
    /// state. Zero is understood as one.
    pub fn with_checkpoint(mut self, checkpoint: usize) -> Self {
        self.checkpoint = checkpoint.max(1);
        self
    }

    async fn save_position(
        &self,
        state: &mut SyncState,
        position: Option<DateTime<Local>>,
        ids: &[String],
    ) -> Result<()> {
        if let Some(position) = position {
            let channel = state.channel_mut(&self.channel);
            channel.last_sync = Some(position);
            channel.last_ids = ids.to_vec();
        }

        self.state_file.save(state).await?;
        Ok(())
    }

    /// Loads the state, backs up the new events of the source, then
    /// saves the state.
    pub async fn run(
        &self,
        source: &mut dyn MessageSource,
        driver: &mut dyn Driver,
        store: &mut Store,
    ) -> Result<BackupReport> {
        let (mut state, first) = self.state_file.load_or_init().await?;
        let mut report = self.backup(source, driver, store, &mut state).await?;
        report.first = first;
        Ok(report)
    }

    /// Backs up the events of the source that happened after the
    /// last synchronized position of the channel.
    ///
    /// The position is made of the timestamp of the last event stored
    /// and of the identifiers of the events stored at that timestamp,
    /// so that events sharing a timestamp are never skipped. It is
    /// saved every checkpoint. On failure, the position of the last
    /// event stored is saved before the error is returned, so that
    /// the next run resumes right after it.
    pub async fn backup(
        &self,
        source: &mut dyn MessageSource,
        driver: &mut dyn Driver,
        store: &mut Store,
        state: &mut SyncState,
    ) -> Result<BackupReport> {
        let channel = state.channel(&self.channel);
        let after = channel.and_then(|c| c.last_sync);
        let mut ids = channel.map(|c| c.last_ids.clone()).unwrap_or_default();
        info!(channel = %self.channel, ?after, "backing up events");

        let events = source
            .events(&state.token, after)
            .await
            .map_err(Error::FetchEventsError)?;

        let events: Vec<_> = events
            .into_iter()
            .filter(|event| match after {
                Some(after) if event.timestamp == after => !ids.contains(&event.id),
                Some(after) => event.timestamp > after,
                None => true,
            })
            .collect();
        let total = events.len();
        debug!("{total} events need to be backed up");

        let mut report = BackupReport::default();
        let mut position = after;

        for event in events {
            if let Err(err) = append(driver, store, event.data).await {
                warn!(id = %event.id, "{err}");
                self.save_position(state, position, &ids).await?;
                return Err(Error::BackupEventError(event.id, Box::new(err)));
            }

            if position != Some(event.timestamp) {
                position = Some(event.timestamp);
                ids.clear();
            }
            ids.push(event.id);

            report.stored += 1;
            report.position = position;

            if total - report.stored < self.checkpoint || report.stored % self.checkpoint == 0 {
                debug!("{}/{total} events backed up", report.stored);
            }

            if report.stored % self.checkpoint == 0 {
                self.save_position(state, position, &ids).await?;
            }
        }

        self.save_position(state, position, &ids).await?;
        info!(channel = %self.channel, "{} events backed up", report.stored);

        Ok(report)
    }
}
