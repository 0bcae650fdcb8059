//! Module dedicated to channel synchronization patch.
//!
//! A patch is built by walking the live records of a channel with
//! one correlator cursor per store, then by collecting the messages
//! no record matched. It is then applied hunk after hunk.

use tracing::{debug, trace};

use crate::{
    correlate::{correlate, Correlation, Cursor},
    driver::Driver,
    flag::{Flag, Flags},
    message::{Message, MessageStatus, Uid},
    ops::Operations,
    record::{RecordStatus, SyncRecord, SyncRecords},
    side::Side,
    store::Store,
};

use super::{
    hunk::{FlagsUpdate, SyncHunk},
    Error, Result,
};

/// A channel synchronization patch is just a list of hunks.
pub type SyncPatch = Vec<SyncHunk>;

/// The presence of the message expected by one side of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Presence {
    /// The message was found at the given index.
    Found(usize),
    /// The record does not expect any message.
    Absent,
    /// The record expects a message that no longer exists.
    Gone,
    /// The message cannot be trusted during this pass.
    Skipped,
}

impl From<Correlation> for Presence {
    fn from(correlation: Correlation) -> Self {
        match correlation {
            Correlation::Found { index, .. } => Self::Found(index),
            Correlation::NotExpected => Self::Absent,
            Correlation::NotPresent => Self::Gone,
            Correlation::Vanished | Correlation::AlreadyProcessed => Self::Skipped,
        }
    }
}

/// The flags the given operations allow to propagate.
fn propagated(ops: Operations) -> Flags {
    let mut flags = Flags::empty();

    if ops.contains(Operations::DELETE) {
        flags.insert(Flag::Deleted);
    }

    if ops.contains(Operations::FLAGS) {
        flags |= Flags::all().without(Flag::Deleted);
    }

    flags
}

/// The outcome of a three-way flags merge.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlagsMerge {
    pub master_add: Flags,
    pub master_remove: Flags,
    pub slave_add: Flags,
    pub slave_remove: Flags,
    pub snapshot: Flags,
}

/// Three-way merge of the flags of a matched message pair against
/// the flags snapshot of their record.
///
/// A change made on one side (compared to the snapshot) is applied
/// to the other side when the operations directed at that other side
/// allow it. Returns the updates of the master and slave messages,
/// and the new snapshot.
pub fn merge_flags(
    snapshot: Flags,
    master: Flags,
    slave: Flags,
    master_ops: Operations,
    slave_ops: Operations,
) -> FlagsMerge {
    let (to_master, to_slave) = (propagated(master_ops), propagated(slave_ops));

    let master_added = master - snapshot;
    let master_removed = snapshot - master;
    let slave_added = slave - snapshot;
    let slave_removed = snapshot - slave;

    let slave_add = (master_added & to_slave) - slave;
    let slave_remove = master_removed & to_slave & slave;
    let master_add = (slave_added & to_master) - master;
    let master_remove = slave_removed & to_master & master;

    let agreed_added = (master_added & to_slave) | (slave_added & to_master);
    let agreed_added = agreed_added | (master_added & slave_added);
    let agreed_removed = (master_removed & to_slave) | (slave_removed & to_master);
    let agreed_removed = agreed_removed | (master_removed & slave_removed);

    let snapshot = (snapshot | agreed_added) - agreed_removed;

    FlagsMerge {
        master_add,
        master_remove,
        slave_add,
        slave_remove,
        snapshot,
    }
}

/// Builds the patch of a channel.
///
/// `master_ops` are the operations applied to the master store,
/// `slave_ops` the ones applied to the slave store. Matched messages
/// are marked as processed, unmatched ones as not synchronized.
pub fn build(
    master_ops: Operations,
    slave_ops: Operations,
    records: &SyncRecords,
    master: &mut Store,
    slave: &mut Store,
) -> SyncPatch {
    let ops = |side: Side| match side {
        Side::Master => master_ops,
        Side::Slave => slave_ops,
    };

    let mut patch = SyncPatch::new();
    let mut master_cursor = Cursor::new(master);
    let mut slave_cursor = Cursor::new(slave);

    for (id, record) in records.iter().enumerate() {
        if record.is_dead() {
            continue;
        }

        trace!("{record}");

        let m = Presence::from(correlate(master, record.master_uid, &mut master_cursor));
        let s = Presence::from(correlate(slave, record.slave_uid, &mut slave_cursor));

        match (m, s) {
            (Presence::Skipped, _) | (_, Presence::Skipped) => {
                debug!("skipping {record}: message cannot be trusted");
            }
            (Presence::Found(mi), Presence::Found(si)) => {
                let merge = merge_flags(
                    record.flags,
                    master.messages()[mi].flags,
                    slave.messages()[si].flags,
                    master_ops,
                    slave_ops,
                );
                let snapshot = merge.snapshot;

                let master_update = FlagsUpdate {
                    uid: record.master_uid,
                    add: merge.master_add,
                    remove: merge.master_remove,
                };
                let slave_update = FlagsUpdate {
                    uid: record.slave_uid,
                    add: merge.slave_add,
                    remove: merge.slave_remove,
                };

                if master_update.is_empty() && slave_update.is_empty() && snapshot == record.flags {
                    continue;
                }

                patch.push(SyncHunk::UpdateFlags {
                    record: id,
                    master: Some(master_update).filter(|u| !u.is_empty()),
                    slave: Some(slave_update).filter(|u| !u.is_empty()),
                    snapshot,
                });
            }
            (Presence::Found(i), Presence::Gone) | (Presence::Gone, Presence::Found(i)) => {
                let gone = if matches!(m, Presence::Gone) {
                    Side::Master
                } else {
                    Side::Slave
                };
                let side = gone.opposite();

                if ops(side).contains(Operations::DELETE) {
                    let uid = match side {
                        Side::Master => master.messages()[i].uid,
                        Side::Slave => slave.messages()[i].uid,
                    };
                    patch.push(SyncHunk::PropagateDeletion { record: id, gone, uid });
                } else {
                    patch.push(SyncHunk::Expire { record: id, gone });
                }
            }
            (Presence::Found(i), Presence::Absent) | (Presence::Absent, Presence::Found(i)) => {
                let absent = if matches!(m, Presence::Absent) {
                    Side::Master
                } else {
                    Side::Slave
                };
                let from = absent.opposite();

                if record.status.is_gone_on(absent) {
                    continue;
                }

                if record.status.contains(RecordStatus::pending_on(absent)) {
                    debug!("not copying again {record}: copy not found yet");
                    continue;
                }

                if !ops(absent).contains(Operations::RENEW) {
                    continue;
                }

                let (src, dst) = match from {
                    Side::Master => (&*master, &*slave),
                    Side::Slave => (&*slave, &*master),
                };
                let msg = &src.messages()[i];

                if msg.is_deleted() {
                    debug!(uid = msg.uid, "not copying again deleted message");
                } else if dst.config().exceeds_max_size(msg.size) {
                    debug!(uid = msg.uid, size = msg.size, "not copying again message: too big");
                } else {
                    patch.push(SyncHunk::Recopy {
                        record: id,
                        from,
                        uid: msg.uid,
                    });
                }
            }
            (Presence::Gone | Presence::Absent, Presence::Gone | Presence::Absent) => {
                patch.push(SyncHunk::Forget(id));
            }
        }
    }

    for from in Side::BOTH {
        let (src, dst) = match from {
            Side::Master => (&mut *master, &*slave),
            Side::Slave => (&mut *slave, &*master),
        };

        let copy = ops(from.opposite()).contains(Operations::NEW);

        for i in 0..src.messages().len() {
            let Some(msg) = src.message_mut(i) else {
                continue;
            };

            if msg.is_processed() || msg.is_dead() {
                continue;
            }

            msg.status.insert(MessageStatus::NOT_SYNCED);

            if !copy {
                continue;
            }

            if msg.is_deleted() {
                debug!(uid = msg.uid, "not copying new {from} message: deleted");
            } else if dst.config().exceeds_max_size(msg.size) {
                debug!(uid = msg.uid, size = msg.size, "not copying new {from} message: too big");
            } else {
                patch.push(SyncHunk::CopyNew {
                    from,
                    uid: msg.uid,
                    flags: msg.flags,
                });
            }
        }
    }

    patch
}

/// One side of a channel being synchronized: a store and the driver
/// it has been opened with.
pub struct Endpoint<'a> {
    pub driver: &'a mut dyn Driver,
    pub store: &'a mut Store,
}

impl<'a> Endpoint<'a> {
    pub fn new(driver: &'a mut dyn Driver, store: &'a mut Store) -> Self {
        Self { driver, store }
    }

    async fn set_flags(&mut self, side: Side, update: &FlagsUpdate) -> Result<()> {
        let FlagsUpdate { uid, add, remove } = *update;

        self.driver
            .set_flags(self.store, uid, add, remove)
            .await
            .map_err(|err| Error::SetFlagsError(side, uid, err))?;

        if let Some(msg) = self.store.find_message_mut(uid) {
            msg.flags = (msg.flags | add) - remove;
        }

        Ok(())
    }
}

/// Copies a message between endpoints, returning the UID of the copy
/// and its flags. The UID is 0 when the destination store cannot
/// tell it.
async fn copy(
    from: Side,
    uid: Uid,
    src: &mut Endpoint<'_>,
    dst: &mut Endpoint<'_>,
) -> Result<(Uid, Flags)> {
    let data = src
        .driver
        .fetch_msg(src.store, uid)
        .await
        .map_err(|err| Error::FetchMessageError(from, uid, err))?;

    let new_uid = dst
        .driver
        .store_msg(dst.store, &data, false)
        .await
        .map_err(|err| Error::StoreMessageError(from.opposite(), uid, err))?
        .unwrap_or_default();

    if let Some(msg) = src.store.find_message_mut(uid) {
        msg.status.remove(MessageStatus::NOT_SYNCED);
    }

    if new_uid > 0 {
        let size = data.len() as u64;
        let msg = Message::new(new_uid, data.flags, size).with_status(MessageStatus::PROCESSED);
        dst.store.push_message(msg);
    }

    Ok((new_uid, data.flags))
}

/// Looks for the copies whose UID was not known when they were
/// stored, so that they are neither copied again nor taken for new
/// messages.
///
/// A copy is searched among the messages no live record claims,
/// first by size then by content. A record whose copy cannot be
/// found loses its marker, so that the message can be copied again.
pub async fn adopt_pending<'a>(
    master: &mut Endpoint<'a>,
    slave: &mut Endpoint<'a>,
    records: &mut SyncRecords,
) -> Result<()> {
    let pending: Vec<(usize, Side)> = records
        .iter()
        .enumerate()
        .filter(|(_, record)| !record.is_dead())
        .flat_map(|(index, record)| {
            Side::BOTH
                .into_iter()
                .filter(move |side| record.status.contains(RecordStatus::pending_on(*side)))
                .map(move |side| (index, side))
        })
        .collect();

    for (index, side) in pending {
        let Some(uid) = records.get(index).map(|record| record.uid(side.opposite())) else {
            continue;
        };

        let (src, dst) = match side {
            Side::Master => (&mut *slave, &mut *master),
            Side::Slave => (&mut *master, &mut *slave),
        };

        let copy = find_copy(side.opposite(), uid, src, dst, records).await?;

        if let Some(copy) = copy {
            records.set_uid(index, side, copy)?;
        }

        if let Some(record) = records.get_mut(index) {
            record.status.remove(RecordStatus::pending_on(side));
            match copy {
                Some(_) => debug!("found copy of {record}"),
                None => debug!("copy of {record} not found"),
            }
        }
    }

    Ok(())
}

/// Finds the copy of the given source message among the messages of
/// the destination no live record claims.
async fn find_copy(
    from: Side,
    uid: Uid,
    src: &mut Endpoint<'_>,
    dst: &mut Endpoint<'_>,
    records: &SyncRecords,
) -> Result<Option<Uid>> {
    let size = src
        .store
        .position(uid)
        .and_then(|index| src.store.message(index))
        .filter(|msg| !msg.is_dead())
        .map(|msg| msg.size);

    let Some(size) = size else {
        return Ok(None);
    };

    let candidates: Vec<Uid> = dst
        .store
        .messages()
        .iter()
        .filter(|msg| !msg.is_dead() && msg.size == size)
        .filter(|msg| records.position(from.opposite(), msg.uid).is_none())
        .map(|msg| msg.uid)
        .collect();

    if candidates.is_empty() {
        return Ok(None);
    }

    let data = src
        .driver
        .fetch_msg(src.store, uid)
        .await
        .map_err(|err| Error::FetchMessageError(from, uid, err))?;

    for candidate in candidates {
        let copy = dst
            .driver
            .fetch_msg(dst.store, candidate)
            .await
            .map_err(|err| Error::FetchMessageError(from.opposite(), candidate, err))?;

        if copy.data == data.data {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Applies one hunk of a patch.
pub async fn apply<'a>(
    hunk: &SyncHunk,
    master: &mut Endpoint<'a>,
    slave: &mut Endpoint<'a>,
    records: &mut SyncRecords,
) -> Result<()> {
    match hunk {
        SyncHunk::UpdateFlags {
            record,
            master: master_update,
            slave: slave_update,
            snapshot,
        } => {
            if let Some(update) = master_update {
                master.set_flags(Side::Master, update).await?;
            }

            if let Some(update) = slave_update {
                slave.set_flags(Side::Slave, update).await?;
            }

            if let Some(record) = records.get_mut(*record) {
                record.flags = *snapshot;
            }
        }
        SyncHunk::PropagateDeletion { record, gone, uid } => {
            let side = gone.opposite();
            let target = match side {
                Side::Master => master,
                Side::Slave => slave,
            };

            let deleted = target
                .store
                .find_message_mut(*uid)
                .map(|msg| msg.is_deleted())
                .unwrap_or_default();

            if !deleted {
                let update = FlagsUpdate {
                    uid: *uid,
                    add: Flag::Deleted.into(),
                    remove: Flags::empty(),
                };
                target.set_flags(side, &update).await?;
            }

            if let Some(record) = records.get_mut(*record) {
                record.status.insert(RecordStatus::deleted_on(*gone));
                record.set_uid(*gone, 0);
            }
        }
        SyncHunk::Expire { record, gone } => {
            if let Some(record) = records.get_mut(*record) {
                record.status.insert(RecordStatus::expired_on(*gone));
                record.set_uid(*gone, 0);
            }
        }
        SyncHunk::Forget(record) => {
            records.mark_dead(*record);
        }
        SyncHunk::CopyNew { from, uid, .. } => {
            let (src, dst) = match from {
                Side::Master => (master, slave),
                Side::Slave => (slave, master),
            };

            let (new_uid, flags) = copy(*from, *uid, src, dst).await?;

            let mut record = SyncRecord::new(0, 0, flags);
            record.set_uid(*from, *uid);
            record.set_uid(from.opposite(), new_uid);
            if new_uid <= 0 {
                record.status.insert(RecordStatus::pending_on(from.opposite()));
            }
            records.add(record)?;
        }
        SyncHunk::Recopy { record, from, uid } => {
            let (src, dst) = match from {
                Side::Master => (master, slave),
                Side::Slave => (slave, master),
            };

            let (new_uid, flags) = copy(*from, *uid, src, dst).await?;

            records.set_uid(*record, from.opposite(), new_uid)?;
            if let Some(record) = records.get_mut(*record) {
                record.flags = flags;
                if new_uid <= 0 {
                    record.status.insert(RecordStatus::pending_on(from.opposite()));
                }
            }
        }
    }

    Ok(())
}
