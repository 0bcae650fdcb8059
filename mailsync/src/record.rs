//! # Sync record
//!
//! Module dedicated to sync records, the durable correlation between
//! a master message and a slave message. Records are the only state
//! surviving across runs.

use std::{fmt, ops::BitOr, result};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{flag::Flags, message::Uid, side::Side};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build record status from undefined bits {0:#010b}")]
    UndefinedStatusBitsError(u8),
    #[error("cannot add record: {0} uid {1} is already claimed by a live record")]
    DuplicateUidError(Side, Uid),
}

/// The status of a sync record.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RecordStatus(u8);

impl RecordStatus {
    /// The record is superseded and will be dropped at save time.
    pub const DEAD: Self = Self(1 << 0);
    /// The master message is confirmed gone, without its deletion
    /// being propagated.
    pub const EXPIRED: Self = Self(1 << 1);
    pub const DELETED_ON_MASTER: Self = Self(1 << 2);
    pub const DELETED_ON_SLAVE: Self = Self(1 << 3);
    pub const EXPIRED_ON_SLAVE: Self = Self(1 << 4);
    /// The message was copied to the master store, which could not
    /// tell the UID of the copy.
    pub const PENDING_ON_MASTER: Self = Self(1 << 5);
    /// The message was copied to the slave store, which could not
    /// tell the UID of the copy.
    pub const PENDING_ON_SLAVE: Self = Self(1 << 6);

    const MASK: u8 = 0b111_1111;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::MASK != 0 {
            return Err(Error::UndefinedStatusBitsError(bits));
        }

        Ok(Self(bits))
    }

    pub const fn bits(self) -> u8 {
        self.0
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

    /// The deletion marker of the given side.
    pub fn deleted_on(side: Side) -> Self {
        match side {
            Side::Master => Self::DELETED_ON_MASTER,
            Side::Slave => Self::DELETED_ON_SLAVE,
        }
    }

    /// The expiration marker of the given side.
    pub fn expired_on(side: Side) -> Self {
        match side {
            Side::Master => Self::EXPIRED,
            Side::Slave => Self::EXPIRED_ON_SLAVE,
        }
    }

    /// The unknown copy marker of the given side.
    pub fn pending_on(side: Side) -> Self {
        match side {
            Side::Master => Self::PENDING_ON_MASTER,
            Side::Slave => Self::PENDING_ON_SLAVE,
        }
    }

    /// Whether the message of the given side is known to be gone.
    pub fn is_gone_on(self, side: Side) -> bool {
        self.contains(Self::deleted_on(side)) || self.contains(Self::expired_on(side))
    }
}

impl BitOr for RecordStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl TryFrom<u8> for RecordStatus {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        Self::from_bits(bits)
    }
}

impl From<RecordStatus> for u8 {
    fn from(status: RecordStatus) -> Self {
        status.0
    }
}

/// The sync record.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncRecord {
    /// The UID of the master message, or 0 when there is none.
    pub master_uid: Uid,

    /// The UID of the slave message, or 0 when there is none.
    pub slave_uid: Uid,

    /// The last synchronized flags snapshot.
    pub flags: Flags,

    #[serde(default)]
    pub status: RecordStatus,
}

impl SyncRecord {
    pub fn new(master_uid: Uid, slave_uid: Uid, flags: impl Into<Flags>) -> Self {
        Self {
            master_uid,
            slave_uid,
            flags: flags.into(),
            status: RecordStatus::empty(),
        }
    }

    pub fn uid(&self, side: Side) -> Uid {
        match side {
            Side::Master => self.master_uid,
            Side::Slave => self.slave_uid,
        }
    }

    pub fn set_uid(&mut self, side: Side, uid: Uid) {
        match side {
            Side::Master => self.master_uid = uid,
            Side::Slave => self.slave_uid = uid,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status.contains(RecordStatus::DEAD)
    }

    pub fn mark_dead(&mut self) {
        self.status.insert(RecordStatus::DEAD);
    }
}

impl fmt::Display for SyncRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {} <-> {} ({}, {:#09b})",
            self.master_uid,
            self.slave_uid,
            self.flags,
            self.status.bits()
        )
    }
}

/// The sync records of a channel, in insertion order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRecords(Vec<SyncRecord>);

impl SyncRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncRecord> {
        self.0.iter()
    }

    /// Iterates over the records that are not dead.
    pub fn live(&self) -> impl Iterator<Item = &SyncRecord> {
        self.0.iter().filter(|record| !record.is_dead())
    }

    pub fn get(&self, index: usize) -> Option<&SyncRecord> {
        self.0.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SyncRecord> {
        self.0.get_mut(index)
    }

    /// Finds the position of the live record claiming the given UID
    /// on the given side.
    pub fn position(&self, side: Side, uid: Uid) -> Option<usize> {
        if uid <= 0 {
            return None;
        }

        self.0
            .iter()
            .position(|record| !record.is_dead() && record.uid(side) == uid)
    }

    pub fn find_by_master(&self, uid: Uid) -> Option<&SyncRecord> {
        self.position(Side::Master, uid).and_then(|i| self.get(i))
    }

    pub fn find_by_slave(&self, uid: Uid) -> Option<&SyncRecord> {
        self.position(Side::Slave, uid).and_then(|i| self.get(i))
    }

    /// Adds a record, refusing UIDs already claimed by a live record.
    ///
    /// Returns the position of the new record.
    pub fn add(&mut self, record: SyncRecord) -> Result<usize> {
        for side in Side::BOTH {
            let uid = record.uid(side);
            if self.position(side, uid).is_some() {
                return Err(Error::DuplicateUidError(side, uid));
            }
        }

        debug!("adding {record}");
        self.0.push(record);
        Ok(self.0.len() - 1)
    }

    /// Claims the given UID on the given side for the record at the
    /// given position.
    pub fn set_uid(&mut self, index: usize, side: Side, uid: Uid) -> Result<()> {
        if let Some(other) = self.position(side, uid) {
            if other != index {
                return Err(Error::DuplicateUidError(side, uid));
            }
        }

        if let Some(record) = self.0.get_mut(index) {
            record.set_uid(side, uid);
        }

        Ok(())
    }

    pub fn mark_dead(&mut self, index: usize) {
        if let Some(record) = self.0.get_mut(index) {
            debug!("marking {record} as dead");
            record.mark_dead();
        }
    }

    /// Checks that no two live records claim the same UID on the
    /// same side.
    pub fn check(&self) -> Result<()> {
        for (i, record) in self.live().enumerate() {
            for side in Side::BOTH {
                let uid = record.uid(side);
                if uid <= 0 {
                    continue;
                }

                let claimed = self
                    .live()
                    .skip(i + 1)
                    .any(|other| other.uid(side) == uid);

                if claimed {
                    return Err(Error::DuplicateUidError(side, uid));
                }
            }
        }

        Ok(())
    }

    /// Physically drops dead records.
    pub fn compact(&mut self) {
        let len = self.0.len();
        self.0.retain(|record| !record.is_dead());
        debug!("compacted {} dead records", len - self.0.len());
    }
}

impl FromIterator<SyncRecord> for SyncRecords {
    fn from_iter<T: IntoIterator<Item = SyncRecord>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::side::Side;

    use super::{Error, RecordStatus, SyncRecord, SyncRecords};

    #[test]
    fn add_and_find() {
        let mut records = SyncRecords::new();
        records.add(SyncRecord::new(1, 10, "S")).unwrap();
        records.add(SyncRecord::new(2, 0, "")).unwrap();
        records.add(SyncRecord::new(0, 30, "F")).unwrap();

        assert_eq!(records.find_by_master(1).unwrap().slave_uid, 10);
        assert_eq!(records.find_by_slave(30).unwrap().master_uid, 0);
        assert!(records.find_by_master(0).is_none());
        assert!(records.find_by_slave(0).is_none());
        assert!(records.find_by_slave(99).is_none());
    }

    #[test]
    fn add_rejects_live_duplicates() {
        let mut records = SyncRecords::new();
        records.add(SyncRecord::new(1, 10, "")).unwrap();

        assert!(matches!(
            records.add(SyncRecord::new(1, 11, "")),
            Err(Error::DuplicateUidError(Side::Master, 1))
        ));
        assert!(matches!(
            records.add(SyncRecord::new(2, 10, "")),
            Err(Error::DuplicateUidError(Side::Slave, 10))
        ));

        records.mark_dead(0);
        records.add(SyncRecord::new(1, 10, "")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.live().count(), 1);
    }

    #[test]
    fn set_uid_rejects_claimed_uid() {
        let mut records = SyncRecords::new();
        records.add(SyncRecord::new(1, 10, "")).unwrap();
        records.add(SyncRecord::new(2, 0, "")).unwrap();

        assert!(records.set_uid(1, Side::Slave, 10).is_err());
        records.set_uid(1, Side::Slave, 20).unwrap();
        records.set_uid(0, Side::Slave, 10).unwrap();
        assert_eq!(records.find_by_slave(20).unwrap().master_uid, 2);
    }

    #[test]
    fn check_detects_duplicates() {
        let records = SyncRecords::from_iter([
            SyncRecord::new(1, 10, ""),
            SyncRecord::new(2, 10, ""),
        ]);
        assert!(matches!(
            records.check(),
            Err(Error::DuplicateUidError(Side::Slave, 10))
        ));

        let mut dead = SyncRecord::new(2, 10, "");
        dead.mark_dead();
        let records = SyncRecords::from_iter([
            SyncRecord::new(1, 10, ""),
            dead,
            SyncRecord::new(0, 0, ""),
            SyncRecord::new(0, 0, ""),
        ]);
        records.check().unwrap();
    }

    #[test]
    fn compact_drops_dead_records() {
        let mut records = SyncRecords::from_iter([
            SyncRecord::new(1, 10, ""),
            SyncRecord::new(2, 20, ""),
            SyncRecord::new(3, 30, ""),
        ]);
        records.mark_dead(1);
        records.compact();

        let uids: Vec<_> = records.iter().map(|r| r.master_uid).collect();
        assert_eq!(uids, vec![1, 3]);
    }

    #[test]
    fn status_rejects_undefined_bits() {
        assert!(RecordStatus::from_bits(0b1000_0000).is_err());
        assert_eq!(
            RecordStatus::from_bits(0b110_0000).unwrap(),
            RecordStatus::PENDING_ON_MASTER | RecordStatus::PENDING_ON_SLAVE
        );
        let status = RecordStatus::from_bits(0b0_0101).unwrap();
        assert!(status.contains(RecordStatus::DEAD | RecordStatus::DELETED_ON_MASTER));
        assert_eq!(RecordStatus::deleted_on(Side::Slave), RecordStatus::DELETED_ON_SLAVE);
    }
}
