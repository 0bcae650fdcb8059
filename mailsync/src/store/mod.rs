//! # Store
//!
//! Module dedicated to stores. A store is one side of a channel: an
//! ordered list of messages living in its own UID space, plus the
//! configuration it has been opened with.

pub mod config;

use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    message::{Message, Uid},
    options::OpenOptions,
};

#[doc(inline)]
pub use self::config::StoreConfig;

/// The store.
///
/// The message list is owned by the store and mutated in place
/// during a synchronization pass. Every structural change of the
/// list (messages added, removed or replaced) bumps the store
/// generation, which invalidates outstanding correlator cursors.
#[derive(Clone, Debug)]
pub struct Store {
    config: Arc<StoreConfig>,
    name: String,
    uid_validity: Option<u32>,
    options: OpenOptions,
    messages: Vec<Message>,
    generation: u64,
    bad: bool,
}

impl Store {
    pub fn new(config: Arc<StoreConfig>) -> Self {
        Self {
            config,
            name: String::new(),
            uid_validity: None,
            options: OpenOptions::empty(),
            messages: Vec::new(),
            generation: 0,
            bad: false,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The name of the mailbox opened on this store.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl ToString) {
        self.name = name.to_string();
    }

    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.set_name(name);
        self
    }

    pub fn uid_validity(&self) -> Option<u32> {
        self.uid_validity
    }

    pub fn set_uid_validity(&mut self, uid_validity: u32) {
        self.uid_validity = Some(uid_validity);
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn set_options(&mut self, options: OpenOptions) {
        self.options = options;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replaces the whole message list, usually after listing the
    /// mailbox.
    pub fn set_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages = messages.into_iter().collect();
        self.generation += 1;
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.set_messages(messages);
        self
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.generation += 1;
    }

    /// Drops the messages that were expunged.
    pub fn retain_messages(&mut self, f: impl FnMut(&Message) -> bool) {
        self.messages.retain(f);
        self.generation += 1;
    }

    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn message_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.messages.get_mut(index)
    }

    pub fn position(&self, uid: Uid) -> Option<usize> {
        self.messages.iter().position(|msg| msg.uid == uid)
    }

    pub fn find_message_mut(&mut self, uid: Uid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|msg| msg.uid == uid)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the driver reported the store as unusable.
    pub fn is_bad(&self) -> bool {
        self.bad
    }

    pub fn mark_bad(&mut self) {
        if !self.bad {
            debug!(store = %self.config.name, "marking store as bad");
        }
        self.bad = true;
    }

    /// Traces every message of the store.
    pub fn dump(&self) {
        for msg in &self.messages {
            trace!(store = %self.config.name, "  {msg}");
        }
    }
}
