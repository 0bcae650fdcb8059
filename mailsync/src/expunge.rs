//! # Expunge
//!
//! Module dedicated to the expunge pass of a store: every message
//! flagged as deleted is first moved to a trash when the trash
//! policies ask for it, then the store is closed, which physically
//! removes the deleted messages.
//!
//! Trashing is evaluated for every deleted message before the close,
//! and the first failure aborts the whole pass: a deleted message is
//! never removed before its trash copy exists.

use std::{fmt, result};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    driver::{self, Driver},
    message::{Message, Uid},
    store::Store,
};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot expunge store {0}: store is no longer usable")]
    SourceBadError(String),
    #[error("cannot expunge store {0}: remote store {1} is no longer usable")]
    DestBadError(String, String),
    #[error("cannot move message {1} of store {0} to trash")]
    TrashMessageError(String, Uid, #[source] driver::Error),
    #[error("cannot fetch message {1} of store {0} for remote trash")]
    FetchMessageError(String, Uid, #[source] driver::Error),
    #[error("cannot copy message {1} to trash of remote store {0}")]
    StoreMessageError(String, Uid, #[source] driver::Error),
    #[error("cannot close store {0}")]
    CloseError(String, #[source] driver::Error),
}

impl Error {
    /// The pass status the error stands for, depending on which
    /// operation failed and whether the driver declared its store
    /// unusable.
    pub fn status(&self) -> ExpungeStatus {
        match self {
            Self::SourceBadError(..) => ExpungeStatus::SourceBad,
            Self::DestBadError(..) => ExpungeStatus::DestBad,
            Self::TrashMessageError(_, _, err)
            | Self::FetchMessageError(_, _, err)
            | Self::CloseError(_, err)
                if err.is_store_bad() =>
            {
                ExpungeStatus::SourceBad
            }
            Self::StoreMessageError(_, _, err) if err.is_store_bad() => ExpungeStatus::DestBad,
            _ => ExpungeStatus::Fail,
        }
    }
}

/// The outcome of an expunge pass.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExpungeStatus {
    /// Every deleted message was processed and the store closed.
    Ok,

    /// An operation failed while both stores are still usable.
    Fail,

    /// The expunged store is no longer usable.
    SourceBad,

    /// The remote store is no longer usable.
    DestBad,
}

impl fmt::Display for ExpungeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "failed"),
            Self::SourceBad => write!(f, "store bad"),
            Self::DestBad => write!(f, "remote store bad"),
        }
    }
}

impl<T> From<&Result<T>> for ExpungeStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) => err.status(),
        }
    }
}

/// Expunges the given store, `remote` being its counterpart in the
/// channel.
///
/// Same as [`try_expunge`], except that the error is logged and
/// collapsed into its status.
pub async fn expunge(
    driver: &mut dyn Driver,
    store: &mut Store,
    remote_driver: &mut dyn Driver,
    remote: &mut Store,
) -> ExpungeStatus {
    let result = try_expunge(driver, store, remote_driver, remote).await;

    if let Err(err) = &result {
        warn!("{err}");
        debug!("{err:?}");
    }

    ExpungeStatus::from(&result)
}

/// Expunges the given store, `remote` being its counterpart in the
/// channel.
///
/// For every live message flagged as deleted:
///
/// - when the store has a trash, the message is moved to it, unless
///   the trash only accepts new messages and the message was already
///   synchronized;
/// - otherwise, when the remote store trashes remote new messages and
///   the message was never synchronized, the message is copied into
///   the remote trash, unless it exceeds the remote maximum size.
///
/// The store is then closed. On success, deleted messages are
/// dropped from the message list. A store declared unusable by its
/// driver is marked as bad.
pub async fn try_expunge(
    driver: &mut dyn Driver,
    store: &mut Store,
    remote_driver: &mut dyn Driver,
    remote: &mut Store,
) -> Result<()> {
    let name = store.config().name.clone();

    if store.is_bad() {
        return Err(Error::SourceBadError(name));
    }

    debug!(store = %name, mailbox = store.name(), "expunging store");

    let deleted: Vec<Message> = store
        .messages()
        .iter()
        .filter(|msg| msg.is_deleted() && !msg.is_dead())
        .cloned()
        .collect();

    for msg in deleted {
        if let Err(err) = dispose(driver, store, remote_driver, remote, &msg).await {
            mark_bad(&err, store, remote);
            return Err(err);
        }
    }

    if let Err(err) = driver.close(store).await {
        let err = Error::CloseError(name, err);
        mark_bad(&err, store, remote);
        return Err(err);
    }

    store.retain_messages(|msg| !msg.is_deleted());

    Ok(())
}

/// Moves the given deleted message to the appropriate trash, if any.
async fn dispose(
    driver: &mut dyn Driver,
    store: &mut Store,
    remote_driver: &mut dyn Driver,
    remote: &mut Store,
    msg: &Message,
) -> Result<()> {
    let uid = msg.uid;
    let config = store.config();

    if config.has_trash() {
        if config.trash_only_new && !msg.is_new() {
            debug!(uid, "not trashing message: not new");
            return Ok(());
        }

        debug!(uid, "trashing message");
        let name = config.name.clone();
        return driver
            .trash_msg(store, uid)
            .await
            .map_err(|err| Error::TrashMessageError(name, uid, err));
    }

    let remote_config = remote.config();

    if !remote_config.trashes_remote_new() {
        return Ok(());
    }

    if !msg.is_new() {
        debug!(uid, "not remote trashing message: not new");
        return Ok(());
    }

    if remote_config.exceeds_max_size(msg.size) {
        debug!(uid, size = msg.size, "not remote trashing message: too big");
        return Ok(());
    }

    if remote.is_bad() {
        let remote_name = remote_config.name.clone();
        return Err(Error::DestBadError(config.name.clone(), remote_name));
    }

    debug!(uid, "remote trashing message");
    let name = config.name.clone();
    let remote_name = remote_config.name.clone();

    let data = driver
        .fetch_msg(store, uid)
        .await
        .map_err(|err| Error::FetchMessageError(name, uid, err))?;

    remote_driver
        .store_msg(remote, &data, true)
        .await
        .map_err(|err| Error::StoreMessageError(remote_name, uid, err))?;

    Ok(())
}

fn mark_bad(err: &Error, store: &mut Store, remote: &mut Store) {
    match err.status() {
        ExpungeStatus::SourceBad => store.mark_bad(),
        ExpungeStatus::DestBad => remote.mark_bad(),
        ExpungeStatus::Ok | ExpungeStatus::Fail => (),
    }
}
