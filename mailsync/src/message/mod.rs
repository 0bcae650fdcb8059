//! # Message
//!
//! Module dedicated to the messages listed by a store. A message is
//! only known by its store-local identifier, its size and its
//! flags: the engine never looks at its content.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

use crate::flag::{Flag, Flags};

/// Alias for a store-local message identifier.
///
/// A UID is meaningless outside of its store. Values lower or equal
/// to zero mean "no message".
pub type Uid = i64;

/// The transient session status of a message.
///
/// These bits live as long as the store is open and are never
/// persisted.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct MessageStatus(u8);

impl MessageStatus {
    /// The message disappeared during this session.
    pub const DEAD: Self = Self(1 << 0);

    /// The message has already been matched during this pass.
    pub const PROCESSED: Self = Self(1 << 1);

    /// The message has not been synchronized to the counterpart
    /// store yet.
    pub const NOT_SYNCED: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for MessageStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MessageStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One entry of a store message list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    pub uid: Uid,
    pub flags: Flags,
    pub size: u64,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(uid: Uid, flags: impl Into<Flags>, size: u64) -> Self {
        Self {
            uid,
            flags: flags.into(),
            size,
            status: MessageStatus::empty(),
        }
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status |= status;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(Flag::Deleted)
    }

    pub fn is_dead(&self) -> bool {
        self.status.contains(MessageStatus::DEAD)
    }

    pub fn is_processed(&self) -> bool {
        self.status.contains(MessageStatus::PROCESSED)
    }

    /// Whether the message is new since the last synchronization.
    pub fn is_new(&self) -> bool {
        self.status.contains(MessageStatus::NOT_SYNCED)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message {}, {}, {}", self.uid, self.flags, self.size)
    }
}

/// The raw content of a message, as fetched from or stored into a
/// store.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageData {
    pub data: Vec<u8>,
    pub flags: Flags,

    /// Whether line endings of [`MessageData::data`] are CRLF.
    pub crlf: bool,
}

impl MessageData {
    pub fn new(data: impl Into<Vec<u8>>, flags: impl Into<Flags>) -> Self {
        Self {
            data: data.into(),
            flags: flags.into(),
            crlf: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
