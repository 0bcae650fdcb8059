//! # Open options
//!
//! Module dedicated to the capabilities a store must be opened
//! with. They are derived from the resolved channel operations and
//! from the trash policies of both stores, see [`derive`].

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

use crate::{ops::Operations, store::config::StoreConfig};

/// The set of capabilities requested when opening a store.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct OpenOptions(u8);

impl OpenOptions {
    /// List messages known from a previous synchronization.
    pub const OLD: Self = Self(1 << 0);
    /// List messages that appeared since the last synchronization.
    pub const NEW: Self = Self(1 << 1);
    /// Fetch message flags.
    pub const FLAGS: Self = Self(1 << 2);
    /// Fetch message sizes.
    pub const SIZE: Self = Self(1 << 3);
    /// Allow flags to be changed.
    pub const SETFLAGS: Self = Self(1 << 4);
    /// Allow messages to be appended.
    pub const APPEND: Self = Self(1 << 5);
    /// Allow messages to be expunged.
    pub const EXPUNGE: Self = Self(1 << 6);
    /// Allow the mailbox to be created.
    pub const CREATE: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OpenOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::OLD, "old"),
            (Self::NEW, "new"),
            (Self::FLAGS, "flags"),
            (Self::SIZE, "size"),
            (Self::SETFLAGS, "setflags"),
            (Self::APPEND, "append"),
            (Self::EXPUNGE, "expunge"),
            (Self::CREATE, "create"),
        ];

        let names: Vec<_> = names
            .into_iter()
            .filter(|(opt, _)| self.contains(*opt))
            .map(|(_, name)| name)
            .collect();

        write!(f, "[{}]", names.join(", "))
    }
}

/// Accumulates into `dst_opts` and `src_opts` the options required
/// to apply `dst_ops` to the destination store, with `src` being
/// its counterpart.
///
/// Options are only ever added: running this function in any order
/// over both directions leads to the same result.
pub fn accumulate(
    dst_ops: Operations,
    dst: &StoreConfig,
    dst_opts: &mut OpenOptions,
    src: &StoreConfig,
    src_opts: &mut OpenOptions,
) {
    use OpenOptions as Opt;
    use Operations as Op;

    if dst_ops.intersects(Op::DELETE | Op::FLAGS) {
        *dst_opts |= Opt::SETFLAGS;
        *src_opts |= Opt::OLD;
        if dst_ops.contains(Op::FLAGS) {
            *src_opts |= Opt::FLAGS;
        }
    }

    if dst_ops.intersects(Op::NEW | Op::RENEW) {
        *dst_opts |= Opt::APPEND;
        if dst_ops.contains(Op::RENEW) {
            *src_opts |= Opt::OLD;
        }
        if dst_ops.contains(Op::NEW) {
            *src_opts |= Opt::NEW;
        }
        if dst_ops.contains(Op::EXPUNGE) {
            *src_opts |= Opt::FLAGS;
        }
        if dst.max_size.is_some() {
            *src_opts |= Opt::SIZE;
        }
    }

    if dst_ops.contains(Op::EXPUNGE) {
        *dst_opts |= Opt::EXPUNGE;
        if dst.has_trash() {
            if !dst.trash_only_new {
                *dst_opts |= Opt::OLD;
            }
            *dst_opts |= Opt::NEW | Opt::FLAGS;
        } else if src.trashes_remote_new() {
            *dst_opts |= Opt::NEW | Opt::FLAGS;
        }
    }

    if dst_ops.contains(Op::CREATE) {
        *dst_opts |= Opt::CREATE;
    }
}

/// Derives the open options of the master and slave stores from the
/// resolved channel operations.
pub fn derive(
    master_ops: Operations,
    slave_ops: Operations,
    master: &StoreConfig,
    slave: &StoreConfig,
) -> (OpenOptions, OpenOptions) {
    let mut master_opts = OpenOptions::empty();
    let mut slave_opts = OpenOptions::empty();

    accumulate(slave_ops, slave, &mut slave_opts, master, &mut master_opts);
    accumulate(master_ops, master, &mut master_opts, slave, &mut slave_opts);

    (master_opts, slave_opts)
}
