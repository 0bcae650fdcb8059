//! # Correlate
//!
//! Module dedicated to message correlation: finding, in the message
//! list of a store, the message a sync record expects.
//!
//! Both stores usually list messages in the same relative order as
//! the sync records, so a [`Cursor`] remembers where the previous
//! match was found and the next lookup tries the following message
//! first.

use tracing::debug;

use crate::{
    message::{Message, MessageStatus, Uid},
    store::Store,
};

/// A position in the message list of a store.
///
/// The cursor remembers the generation of the list it points into:
/// once the list structurally changed, the position is ignored and
/// lookups fall back to a full scan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Cursor {
    index: usize,
    generation: u64,
}

impl Cursor {
    /// Creates a cursor pointing at the first message of the store.
    pub fn new(store: &Store) -> Self {
        Self {
            index: 0,
            generation: store.generation(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn hint(&self, store: &Store) -> Option<usize> {
        if self.generation == store.generation() && self.index < store.messages().len() {
            Some(self.index)
        } else {
            None
        }
    }

    fn advance_past(&mut self, store: &Store, index: usize) {
        self.index = index + 1;
        self.generation = store.generation();
    }
}

/// The outcome of a correlation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Correlation {
    /// No message was expected.
    NotExpected,

    /// The message was found at the given index, either right under
    /// the cursor or by scanning the whole list.
    Found { index: usize, in_sequence: bool },

    /// The message was found but died during this session.
    Vanished,

    /// The message was found but has already been matched during
    /// this pass.
    AlreadyProcessed,

    /// No message of the store has the expected UID.
    NotPresent,
}

impl Correlation {
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Found { index, .. } => Some(index),
            _ => None,
        }
    }
}

/// Correlates the message of the given store having the expected
/// UID.
///
/// A found message is marked as processed, so that it is never
/// matched twice during the same pass. The cursor moves past any
/// message carrying the expected UID, alive or not.
pub fn correlate(store: &mut Store, uid: Uid, cursor: &mut Cursor) -> Correlation {
    let name = &store.config().name;

    if uid <= 0 {
        debug!(store = %name, "no message expected");
        return Correlation::NotExpected;
    }

    let (index, in_sequence) = match cursor.hint(store) {
        Some(index) if store.messages()[index].uid == uid => {
            debug!(store = %name, uid, "message came in sequence");
            (index, true)
        }
        _ => match store.position(uid) {
            Some(index) => {
                debug!(store = %name, uid, "message came out of sequence");
                (index, false)
            }
            None => {
                debug!(store = %name, uid, "message not present");
                return Correlation::NotPresent;
            }
        },
    };

    cursor.advance_past(store, index);

    let Some(msg) = store.message_mut(index) else {
        return Correlation::NotPresent;
    };

    if msg.is_dead() {
        debug!(uid, "… but it vanished under our feet");
        return Correlation::Vanished;
    }

    if msg.is_processed() {
        debug!(uid, "… but it has already been processed");
        return Correlation::AlreadyProcessed;
    }

    msg.status.insert(MessageStatus::PROCESSED);
    Correlation::Found { index, in_sequence }
}

/// Finds the message of the given store having the expected UID.
///
/// Same as [`correlate`], except that every outcome other than a
/// match collapses into `None`.
pub fn find<'a>(store: &'a mut Store, uid: Uid, cursor: &mut Cursor) -> Option<&'a mut Message> {
    let index = correlate(store, uid, cursor).index()?;
    store.message_mut(index)
}
