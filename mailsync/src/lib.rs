//! Rust library to keep two message stores convergent.
//!
//! A [`channel`] binds a mailbox of a master store to a mailbox of a
//! slave store. Synchronizing a channel correlates the messages of
//! both stores through persisted [`record`]s, propagates new
//! messages, flag changes and deletions in the directions allowed by
//! the channel [`ops`], then optionally expunges both stores.
//!
//! Stores are reached through the [`Driver`](crate::driver::Driver)
//! trait, so the library knows nothing about IMAP, Maildir or any
//! other protocol.
//!
//! The library also exposes a one-way [`feed`] backup, which appends
//! events of a message source (phone calls, text messages…) into a
//! store and remembers the last position backed up.
//!
//! See examples in the /tests folder.

pub mod channel;
pub mod config;
pub mod correlate;
pub mod driver;
mod error;
pub mod expunge;
pub mod feed;
pub mod flag;
pub mod message;
pub mod ops;
pub mod options;
pub mod record;
pub mod registry;
pub mod side;
pub mod state;
pub mod store;
pub mod sync;

#[doc(inline)]
pub use self::{
    channel::ChannelSync,
    config::Config,
    error::{AnyBoxedError, AnyResult, Error, Result},
    flag::{Flag, Flags},
    message::{Message, Uid},
    ops::Operations,
    side::Side,
    state::{StateFile, SyncState},
    store::{Store, StoreConfig},
    sync::{SyncBuilder, SyncReport},
};
