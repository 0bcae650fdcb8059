mod common;

use std::sync::Arc;

use mailsync::{
    channel::{self, SyncHunk},
    expunge::ExpungeStatus,
    ops::{self, Operations},
    record::RecordStatus,
    state::ChannelState,
    ChannelSync, Flag, Flags, Side, StoreConfig,
};

use common::{MockDriver, UidlessDriver};

fn channel(ops: Operations) -> ChannelSync {
    let master = Arc::new(StoreConfig::new("remote"));
    let slave = Arc::new(StoreConfig::new("local"));
    let ops = ops::resolve([ops]).unwrap();
    ChannelSync::new("inbox", master, slave, ops)
}

fn drivers() -> (MockDriver, MockDriver) {
    let master = MockDriver::new("remote");
    master.mailbox().append("from master", "S");

    let slave = MockDriver::new("local");
    slave.mailbox().append("from slave", "F");

    (master, slave)
}

#[test_log::test(tokio::test)]
async fn first_sync_copies_new_messages_both_ways() {
    let (mut master, mut slave) = drivers();
    let mut state = ChannelState::default();

    let report = channel(Operations::empty())
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap();

    assert!(report.is_ok());
    assert_eq!(report.patch.len(), 2);
    assert!(matches!(
        report.patch[0].0,
        SyncHunk::CopyNew { from: Side::Master, uid: 1, .. }
    ));
    assert!(matches!(
        report.patch[1].0,
        SyncHunk::CopyNew { from: Side::Slave, uid: 1, .. }
    ));

    assert_eq!(master.mailbox().bodies(), vec!["from master", "from slave"]);
    assert_eq!(slave.mailbox().bodies(), vec!["from slave", "from master"]);
    assert_eq!(slave.mailbox().flags(2), Some(Flags::from("S")));
    assert_eq!(master.mailbox().flags(2), Some(Flags::from("F")));

    assert_eq!(state.records.len(), 2);
    assert_eq!(state.records.find_by_master(1).unwrap().slave_uid, 2);
    assert_eq!(state.records.find_by_slave(1).unwrap().master_uid, 2);
    assert_eq!(state.master_uid_validity, Some(1));
    assert_eq!(state.slave_uid_validity, Some(1));
    assert!(state.last_sync.is_some());

    assert_eq!(master.calls()[..3], ["open_store", "prepare", "select"]);
    assert_eq!(master.calls().last().unwrap(), "close_store");
    assert_eq!(slave.calls().last().unwrap(), "close_store");
}

#[test_log::test(tokio::test)]
async fn second_sync_propagates_flags_and_deletions() {
    let (mut master, mut slave) = drivers();
    let mut state = ChannelState::default();
    let channel = channel(Operations::empty());

    channel.sync(&mut master, &mut slave, &mut state).await.unwrap();

    // flag the master message, and remove the slave one
    if let Some((flags, _)) = master.mailbox().messages.get_mut(&1) {
        flags.insert(Flag::Flagged);
    }
    slave.mailbox().messages.remove(&1);

    let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();

    assert!(report.is_ok());
    assert_eq!(report.patch.len(), 2);
    assert_eq!(slave.mailbox().flags(2), Some(Flags::from("FS")));
    assert!(master
        .mailbox()
        .flags(2)
        .unwrap()
        .contains(Flag::Deleted));

    let synced = state.records.find_by_master(1).unwrap();
    assert_eq!(synced.flags, Flags::from("FS"));

    let deleted = state.records.find_by_master(2).unwrap();
    assert_eq!(deleted.slave_uid, 0);
    assert!(deleted
        .status
        .contains(RecordStatus::deleted_on(Side::Slave)));

    // nothing left to do
    let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();
    assert!(report.patch.is_empty());
}

#[test_log::test(tokio::test)]
async fn expire_without_delete_propagation() {
    let (mut master, mut slave) = drivers();
    let mut state = ChannelState::default();

    channel(Operations::empty())
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap();

    slave.mailbox().messages.remove(&2);

    let ops = "pull new flags".parse().unwrap();
    let report = channel(ops)
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap();

    assert!(matches!(
        report.patch[..],
        [(SyncHunk::Expire { gone: Side::Slave, .. }, None)]
    ));
    assert!(!master.mailbox().flags(1).unwrap().contains(Flag::Deleted));

    let expired = state.records.find_by_master(1).unwrap();
    assert_eq!(expired.slave_uid, 0);
    assert!(expired.status.is_gone_on(Side::Slave));
}

#[test_log::test(tokio::test)]
async fn expunge_after_sync() {
    let mut master = MockDriver::new("remote");
    master.mailbox().append("deleted", "D");
    let mut slave = MockDriver::new("local");
    let mut state = ChannelState::default();

    let report = channel(Operations::expunge(true))
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap();

    assert!(report.patch.is_empty());
    assert!(matches!(report.master_expunge, Some((ExpungeStatus::Ok, None))));
    assert!(matches!(report.slave_expunge, Some((ExpungeStatus::Ok, None))));
    assert!(master.mailbox().messages.is_empty());
    assert!(slave.mailbox().messages.is_empty());
    assert!(state.records.is_empty());
}

#[test_log::test(tokio::test)]
async fn expunge_after_failed_copy() {
    let (mut master, mut slave) = drivers();
    master.mailbox().append("gone", "D");
    slave.fail("store_msg", false);
    let mut state = ChannelState::default();
    let channel = channel(Operations::expunge(true));

    let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();

    assert!(!report.is_ok());
    assert_eq!(report.patch.len(), 2);
    assert!(matches!(
        report.patch[0],
        (
            SyncHunk::CopyNew { from: Side::Master, uid: 1, .. },
            Some(channel::Error::StoreMessageError(Side::Slave, 1, _))
        )
    ));
    assert!(matches!(
        report.patch[1],
        (SyncHunk::CopyNew { from: Side::Slave, uid: 1, .. }, None)
    ));
    assert!(matches!(report.master_expunge, Some((ExpungeStatus::Ok, None))));
    assert!(matches!(report.slave_expunge, Some((ExpungeStatus::Ok, None))));

    // only the deleted message is expunged, the failed copy is not recorded
    assert_eq!(master.mailbox().bodies(), vec!["from master", "from slave"]);
    assert_eq!(slave.mailbox().bodies(), vec!["from slave"]);
    assert_eq!(state.records.len(), 1);
    assert_eq!(state.records.find_by_master(3).unwrap().slave_uid, 1);
    assert!(state.records.find_by_master(1).is_none());

    // the next pass copies the message again
    slave.mailbox().failures.clear();
    let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();

    assert!(report.is_ok());
    assert!(matches!(
        report.patch[..],
        [(SyncHunk::CopyNew { from: Side::Master, uid: 1, .. }, None)]
    ));
    assert_eq!(slave.mailbox().bodies(), vec!["from slave", "from master"]);
    assert_eq!(state.records.find_by_master(1).unwrap().slave_uid, 2);
}

#[test_log::test(tokio::test)]
async fn find_copy_of_unknown_uid() {
    let (mut master, slave) = drivers();
    let mut slave = UidlessDriver(slave);
    let mut state = ChannelState::default();
    let channel = channel(Operations::empty());

    channel.sync(&mut master, &mut slave, &mut state).await.unwrap();

    let pending = state.records.find_by_master(1).unwrap();
    assert_eq!(pending.slave_uid, 0);
    assert!(pending.status.contains(RecordStatus::PENDING_ON_SLAVE));

    for _ in 0..2 {
        let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();
        assert!(report.patch.is_empty());
    }

    assert_eq!(master.mailbox().bodies(), vec!["from master", "from slave"]);
    assert_eq!(slave.0.mailbox().bodies(), vec!["from slave", "from master"]);

    let found = state.records.find_by_master(1).unwrap();
    assert_eq!(found.slave_uid, 2);
    assert_eq!(found.status, RecordStatus::empty());
}

#[test_log::test(tokio::test)]
async fn copy_again_when_unknown_copy_is_lost() {
    let (mut master, slave) = drivers();
    let mut slave = UidlessDriver(slave);
    let mut state = ChannelState::default();
    let channel = channel(Operations::empty());

    channel.sync(&mut master, &mut slave, &mut state).await.unwrap();
    slave.0.mailbox().messages.remove(&2);

    let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();
    assert!(matches!(
        report.patch[..],
        [(SyncHunk::Recopy { from: Side::Master, uid: 1, .. }, None)]
    ));

    let report = channel.sync(&mut master, &mut slave, &mut state).await.unwrap();
    assert!(report.patch.is_empty());

    assert_eq!(slave.0.mailbox().bodies(), vec!["from slave", "from master"]);
    assert_eq!(state.records.find_by_master(1).unwrap().slave_uid, 3);
}

#[test_log::test(tokio::test)]
async fn dry_run_reports_without_applying() {
    let (mut master, mut slave) = drivers();
    let mut state = ChannelState::default();

    let report = channel(Operations::empty())
        .with_dry_run(true)
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap();

    assert_eq!(report.patch.len(), 2);
    assert!(report.is_ok());
    assert_eq!(master.mailbox().messages.len(), 1);
    assert_eq!(slave.mailbox().messages.len(), 1);
    assert!(state.records.is_empty());
    assert!(state.last_sync.is_none());
}

#[test_log::test(tokio::test)]
async fn bad_store_aborts_remaining_hunks() {
    let (mut master, mut slave) = drivers();
    master.mailbox().append("another one", "");
    slave.fail("store_msg", true);
    let mut state = ChannelState::default();

    let report = channel(Operations::expunge(true))
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap();

    assert!(!report.is_ok());
    assert_eq!(report.patch.len(), 3);
    assert!(matches!(
        report.patch[0].1,
        Some(channel::Error::StoreMessageError(Side::Slave, 1, _))
    ));
    assert!(matches!(
        report.patch[1].1,
        Some(channel::Error::StoreBadError(Side::Slave))
    ));
    assert!(matches!(
        report.patch[2].1,
        Some(channel::Error::StoreBadError(Side::Slave))
    ));
    assert!(report.master_expunge.is_none());
    assert!(report.slave_expunge.is_none());
    assert!(state.records.is_empty());
    assert_eq!(master.mailbox().messages.len(), 2);
}

#[test_log::test(tokio::test)]
async fn uid_validity_change_aborts_channel() {
    let (mut master, mut slave) = drivers();
    let mut state = ChannelState::default();
    let channel = channel(Operations::empty());

    channel.sync(&mut master, &mut slave, &mut state).await.unwrap();
    master.mailbox().uid_validity = 2;

    let err = channel
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        channel::Error::UidValidityError(_, Side::Master, 1, 2)
    ));
    assert_eq!(state.master_uid_validity, Some(1));
    assert_eq!(master.calls().last().unwrap(), "close_store");
    assert_eq!(slave.calls().last().unwrap(), "close_store");
}

#[test_log::test(tokio::test)]
async fn slave_open_failure_closes_master() {
    let (mut master, mut slave) = drivers();
    slave.fail("select", false);
    let mut state = ChannelState::default();

    let err = channel(Operations::empty())
        .sync(&mut master, &mut slave, &mut state)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        channel::Error::SelectMailboxError(Side::Slave, ..)
    ));
    assert_eq!(
        master.calls(),
        vec!["open_store", "prepare", "select", "close_store"]
    );
    assert_eq!(
        slave.calls(),
        vec!["open_store", "prepare", "select", "close_store"]
    );
}
