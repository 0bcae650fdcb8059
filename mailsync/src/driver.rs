//! # Driver
//!
//! Module dedicated to store drivers. A driver speaks the protocol
//! of a store (IMAP, Maildir…) and exposes the handful of
//! capabilities the engine needs through the [`Driver`] trait.

use std::{result, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    flag::Flags,
    message::{MessageData, Uid},
    options::OpenOptions,
    store::{Store, StoreConfig},
    AnyBoxedError,
};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The driver error.
///
/// A driver distinguishes failures leaving its store unusable from
/// failures of a single operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("store {0} is no longer usable")]
    StoreBadError(String, #[source] AnyBoxedError),
    #[error("cannot complete operation on store {0}")]
    OperationError(String, #[source] AnyBoxedError),
}

impl Error {
    pub fn store_bad(store: impl ToString, err: impl Into<AnyBoxedError>) -> Self {
        Self::StoreBadError(store.to_string(), err.into())
    }

    pub fn operation(store: impl ToString, err: impl Into<AnyBoxedError>) -> Self {
        Self::OperationError(store.to_string(), err.into())
    }

    /// Whether the store the error comes from cannot be used anymore.
    pub fn is_store_bad(&self) -> bool {
        matches!(self, Self::StoreBadError(..))
    }
}

/// The store driver.
///
/// Methods are awaited one at a time: the engine never runs two
/// operations concurrently against the same driver.
#[async_trait]
pub trait Driver: Send {
    /// Connects to the store described by the given configuration.
    async fn open_store(&mut self, config: Arc<StoreConfig>) -> Result<Store>;

    /// Prepares the opened store for the given capabilities. The
    /// mailbox to work on is the one named by [`Store::name`].
    async fn prepare(&mut self, store: &mut Store, options: OpenOptions) -> Result<()>;

    /// Lists the messages of the mailbox into the store.
    async fn select(&mut self, store: &mut Store) -> Result<()>;

    /// Fetches the full content and flags of a message.
    async fn fetch_msg(&mut self, store: &mut Store, uid: Uid) -> Result<MessageData>;

    /// Stores a message in the mailbox, or in the trash of the store
    /// when `to_trash` is set. Returns the UID of the new message
    /// when the store can tell it.
    async fn store_msg(
        &mut self,
        store: &mut Store,
        data: &MessageData,
        to_trash: bool,
    ) -> Result<Option<Uid>>;

    /// Adds then removes flags of a message.
    async fn set_flags(
        &mut self,
        store: &mut Store,
        uid: Uid,
        add: Flags,
        remove: Flags,
    ) -> Result<()>;

    /// Moves a message to the trash of the store.
    async fn trash_msg(&mut self, store: &mut Store, uid: Uid) -> Result<()>;

    /// Closes the mailbox, physically removing the messages flagged
    /// as deleted.
    async fn close(&mut self, store: &mut Store) -> Result<()>;

    /// Disconnects from the store.
    async fn close_store(&mut self, _store: Store) {}
}

/// The driver builder.
///
/// Builds the driver in charge of a store, usually by looking at
/// [`StoreConfig::driver`].
#[async_trait]
pub trait DriverBuilder: Send + Sync {
    async fn build(&self, config: &StoreConfig) -> Result<Box<dyn Driver>>;
}
