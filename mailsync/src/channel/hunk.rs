//! Module dedicated to channel synchronization hunks.
//!
//! The core structure of the module is the [`SyncHunk`], which
//! represents one change in a channel patch.

use std::fmt;

use crate::{flag::Flags, message::Uid, side::Side};

/// Alias for the position of a record in the channel records.
pub type RecordId = usize;

/// Flags to add to then remove from a message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FlagsUpdate {
    pub uid: Uid,
    pub add: Flags,
    pub remove: Flags,
}

impl FlagsUpdate {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

impl fmt::Display for FlagsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message {} (+{} -{})", self.uid, self.add, self.remove)
    }
}

/// The channel synchronization hunk.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum SyncHunk {
    /// The flags of the messages matched by the given record need to
    /// be updated on one or both sides, then the record snapshot
    /// needs to be replaced by the given flags.
    UpdateFlags {
        record: RecordId,
        master: Option<FlagsUpdate>,
        slave: Option<FlagsUpdate>,
        snapshot: Flags,
    },

    /// The message of the given side is gone, its counterpart needs
    /// to be flagged as deleted.
    PropagateDeletion {
        record: RecordId,
        gone: Side,
        uid: Uid,
    },

    /// The message of the given side is gone, but the deletion is
    /// not propagated: the record only forgets about it.
    Expire { record: RecordId, gone: Side },

    /// Both messages of the given record are gone.
    Forget(RecordId),

    /// The unmatched message of the given side needs to be copied to
    /// the opposite side, then recorded.
    CopyNew { from: Side, uid: Uid, flags: Flags },

    /// The message of the given side lost its counterpart and needs
    /// to be copied again to the opposite side.
    Recopy {
        record: RecordId,
        from: Side,
        uid: Uid,
    },
}

impl fmt::Display for SyncHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateFlags {
                master,
                slave,
                snapshot,
                ..
            } => {
                write!(f, "Synchronizing flags {snapshot}")?;
                if let Some(update) = master {
                    write!(f, " of master {update}")?;
                }
                if let Some(update) = slave {
                    write!(f, " of slave {update}")?;
                }
                Ok(())
            }
            Self::PropagateDeletion { gone, uid, .. } => {
                let target = gone.opposite();
                write!(f, "Deleting {target} message {uid} (gone from {gone})")
            }
            Self::Expire { record, gone } => {
                write!(f, "Expiring {gone} side of record {record}")
            }
            Self::Forget(record) => {
                write!(f, "Forgetting record {record}")
            }
            Self::CopyNew { from, uid, flags } => {
                let to = from.opposite();
                write!(f, "Copying new {from} message {uid} ({flags}) to {to}")
            }
            Self::Recopy { from, uid, .. } => {
                let to = from.opposite();
                write!(f, "Copying again {from} message {uid} to {to}")
            }
        }
    }
}

impl SyncHunk {
    /// The record the hunk works on, if any.
    pub fn record(&self) -> Option<RecordId> {
        match self {
            Self::UpdateFlags { record, .. } => Some(*record),
            Self::PropagateDeletion { record, .. } => Some(*record),
            Self::Expire { record, .. } => Some(*record),
            Self::Forget(record) => Some(*record),
            Self::CopyNew { .. } => None,
            Self::Recopy { record, .. } => Some(*record),
        }
    }
}
