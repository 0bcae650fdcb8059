use std::{error, result};

use thiserror::Error;

use crate::{
    channel, config, driver, expunge, feed, flag, ops, record, registry, state, store, sync,
};

/// The global any boxed `Error` alias of the library.
///
/// Used where an error is not known at compilation time, for
/// example errors coming from driver or message source
/// implementations.
pub type AnyBoxedError = Box<dyn error::Error + Send + Sync + 'static>;

/// The global any `Result` alias of the library.
///
/// The difference with [`Result`] is that it takes a dynamic error
/// [`AnyBoxedError`].
pub type AnyResult<T> = result::Result<T, AnyBoxedError>;

/// The global `Result` alias of the library.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    FlagError(#[from] flag::Error),
    #[error(transparent)]
    OperationsError(#[from] ops::Error),
    #[error(transparent)]
    StoreConfigError(#[from] store::config::Error),
    #[error(transparent)]
    DriverError(#[from] driver::Error),
    #[error(transparent)]
    RecordError(#[from] record::Error),
    #[error(transparent)]
    ExpungeError(#[from] expunge::Error),
    #[error(transparent)]
    ChannelError(#[from] channel::Error),
    #[error(transparent)]
    ConfigError(#[from] config::Error),
    #[error(transparent)]
    RegistryError(#[from] registry::Error),
    #[error(transparent)]
    StateError(#[from] state::Error),
    #[error(transparent)]
    FeedError(#[from] feed::Error),
    #[error(transparent)]
    SyncError(#[from] sync::Error),
}
