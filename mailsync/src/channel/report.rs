//! # Channel sync report
//!
//! Module dedicated to channel synchronization reporting. The main
//! structure of this module is [`ChannelSyncReport`].

use crate::expunge::{self, ExpungeStatus};

use super::{hunk::SyncHunk, Error};

/// The channel synchronization report.
#[derive(Debug, Default)]
pub struct ChannelSyncReport {
    /// The name of the synchronized channel.
    pub channel: String,

    /// The list of processed hunks associated with an optional error.
    pub patch: Vec<(SyncHunk, Option<Error>)>,

    /// The outcome of the master expunge pass, if any.
    pub master_expunge: Option<(ExpungeStatus, Option<expunge::Error>)>,

    /// The outcome of the slave expunge pass, if any.
    pub slave_expunge: Option<(ExpungeStatus, Option<expunge::Error>)>,
}

impl ChannelSyncReport {
    pub fn new(channel: impl ToString) -> Self {
        Self {
            channel: channel.to_string(),
            ..Default::default()
        }
    }

    /// Iterates over the errors of the report.
    pub fn errors(&self) -> impl Iterator<Item = &dyn std::error::Error> {
        let hunks = self
            .patch
            .iter()
            .filter_map(|(_, err)| err.as_ref())
            .map(|err| err as &dyn std::error::Error);

        let expunges = [&self.master_expunge, &self.slave_expunge]
            .into_iter()
            .filter_map(|outcome| outcome.as_ref())
            .filter_map(|(_, err)| err.as_ref())
            .map(|err| err as &dyn std::error::Error);

        hunks.chain(expunges)
    }

    /// Whether every hunk and every expunge pass succeeded.
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }
}
