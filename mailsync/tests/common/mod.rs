#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use mailsync::{
    driver::{self, Driver, DriverBuilder},
    message::MessageData,
    options::OpenOptions,
    Flag, Flags, Message, Store, StoreConfig, Uid,
};

/// The in-memory content of a mock mailbox.
#[derive(Debug, Default)]
pub struct Mailbox {
    pub uid_validity: u32,
    pub uid_next: Uid,
    pub messages: BTreeMap<Uid, (Flags, Vec<u8>)>,
    pub trash: Vec<Vec<u8>>,

    /// Every driver call, in order.
    pub calls: Vec<String>,

    /// Calls that fail, and whether they leave the store unusable.
    pub failures: HashMap<&'static str, bool>,

    /// The number of messages that can still be stored, if limited.
    pub quota: Option<usize>,
}

impl Mailbox {
    pub fn append(&mut self, data: impl Into<Vec<u8>>, flags: impl Into<Flags>) -> Uid {
        self.uid_next += 1;
        self.messages
            .insert(self.uid_next, (flags.into(), data.into()));
        self.uid_next
    }

    pub fn flags(&self, uid: Uid) -> Option<Flags> {
        self.messages.get(&uid).map(|(flags, _)| *flags)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.messages
            .values()
            .map(|(_, data)| String::from_utf8_lossy(data).to_string())
            .collect()
    }
}

/// A driver recording its calls against a shared in-memory mailbox.
#[derive(Clone, Debug, Default)]
pub struct MockDriver {
    name: String,
    mailbox: Arc<Mutex<Mailbox>>,
}

impl MockDriver {
    pub fn new(name: impl ToString) -> Self {
        let driver = Self {
            name: name.to_string(),
            ..Default::default()
        };
        driver.mailbox().uid_validity = 1;
        driver
    }

    pub fn mailbox(&self) -> MutexGuard<'_, Mailbox> {
        match self.mailbox.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn fail(&self, call: &'static str, store_bad: bool) {
        self.mailbox().failures.insert(call, store_bad);
    }

    pub fn calls(&self) -> Vec<String> {
        self.mailbox().calls.clone()
    }

    fn call(&self, call: &'static str) -> driver::Result<MutexGuard<'_, Mailbox>> {
        let mut mailbox = self.mailbox();
        mailbox.calls.push(call.to_owned());

        let failure = mailbox.failures.get(call).copied();
        match failure {
            Some(true) => Err(driver::Error::store_bad(&self.name, format!("{call} failed"))),
            Some(false) => Err(driver::Error::operation(&self.name, format!("{call} failed"))),
            None => Ok(mailbox),
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn open_store(&mut self, config: Arc<StoreConfig>) -> driver::Result<Store> {
        self.call("open_store")?;
        Ok(Store::new(config))
    }

    async fn prepare(&mut self, _store: &mut Store, _options: OpenOptions) -> driver::Result<()> {
        self.call("prepare")?;
        Ok(())
    }

    async fn select(&mut self, store: &mut Store) -> driver::Result<()> {
        let mailbox = self.call("select")?;
        let messages: Vec<_> = mailbox
            .messages
            .iter()
            .map(|(uid, (flags, data))| Message::new(*uid, *flags, data.len() as u64))
            .collect();
        let uid_validity = mailbox.uid_validity;
        drop(mailbox);

        store.set_uid_validity(uid_validity);
        store.set_messages(messages);
        Ok(())
    }

    async fn fetch_msg(&mut self, _store: &mut Store, uid: Uid) -> driver::Result<MessageData> {
        let mailbox = self.call("fetch_msg")?;
        match mailbox.messages.get(&uid) {
            Some((flags, data)) => Ok(MessageData::new(data.clone(), *flags)),
            None => Err(driver::Error::operation(&self.name, "message not found")),
        }
    }

    async fn store_msg(
        &mut self,
        _store: &mut Store,
        data: &MessageData,
        to_trash: bool,
    ) -> driver::Result<Option<Uid>> {
        let mut mailbox = self.call("store_msg")?;

        if to_trash {
            mailbox.trash.push(data.data.clone());
            return Ok(None);
        }

        match mailbox.quota {
            Some(0) => return Err(driver::Error::operation(&self.name, "quota exceeded")),
            Some(ref mut quota) => *quota -= 1,
            None => (),
        }

        Ok(Some(mailbox.append(data.data.clone(), data.flags)))
    }

    async fn set_flags(
        &mut self,
        _store: &mut Store,
        uid: Uid,
        add: Flags,
        remove: Flags,
    ) -> driver::Result<()> {
        let mut mailbox = self.call("set_flags")?;
        if let Some((flags, _)) = mailbox.messages.get_mut(&uid) {
            *flags = (*flags | add) - remove;
        }
        Ok(())
    }

    async fn trash_msg(&mut self, _store: &mut Store, uid: Uid) -> driver::Result<()> {
        let mut mailbox = self.call("trash_msg")?;
        if let Some((_, data)) = mailbox.messages.get(&uid).cloned() {
            mailbox.trash.push(data);
        }
        Ok(())
    }

    async fn close(&mut self, _store: &mut Store) -> driver::Result<()> {
        let mut mailbox = self.call("close")?;
        mailbox
            .messages
            .retain(|_, (flags, _)| !flags.contains(Flag::Deleted));
        Ok(())
    }

    async fn close_store(&mut self, _store: Store) {
        self.mailbox().calls.push("close_store".to_owned());
    }
}

/// A driver builder handing out mock drivers by store name.
#[derive(Clone, Debug, Default)]
pub struct MockDriverBuilder {
    pub drivers: HashMap<String, MockDriver>,
}

impl MockDriverBuilder {
    pub fn with_driver(mut self, driver: MockDriver) -> Self {
        self.drivers.insert(driver.name.clone(), driver);
        self
    }
}

#[async_trait]
impl DriverBuilder for MockDriverBuilder {
    async fn build(&self, config: &StoreConfig) -> driver::Result<Box<dyn Driver>> {
        match self.drivers.get(&config.name) {
            Some(driver) => Ok(Box::new(driver.clone())),
            None => Err(driver::Error::operation(&config.name, "unknown store")),
        }
    }
}

/// A mock driver whose store cannot tell the UID of the messages it
/// stores.
#[derive(Clone, Debug, Default)]
pub struct UidlessDriver(pub MockDriver);

#[async_trait]
impl Driver for UidlessDriver {
    async fn open_store(&mut self, config: Arc<StoreConfig>) -> driver::Result<Store> {
        self.0.open_store(config).await
    }

    async fn prepare(&mut self, store: &mut Store, options: OpenOptions) -> driver::Result<()> {
        self.0.prepare(store, options).await
    }

    async fn select(&mut self, store: &mut Store) -> driver::Result<()> {
        self.0.select(store).await
    }

    async fn fetch_msg(&mut self, store: &mut Store, uid: Uid) -> driver::Result<MessageData> {
        self.0.fetch_msg(store, uid).await
    }

    async fn store_msg(
        &mut self,
        store: &mut Store,
        data: &MessageData,
        to_trash: bool,
    ) -> driver::Result<Option<Uid>> {
        self.0.store_msg(store, data, to_trash).await?;
        Ok(None)
    }

    async fn set_flags(
        &mut self,
        store: &mut Store,
        uid: Uid,
        add: Flags,
        remove: Flags,
    ) -> driver::Result<()> {
        self.0.set_flags(store, uid, add, remove).await
    }

    async fn trash_msg(&mut self, store: &mut Store, uid: Uid) -> driver::Result<()> {
        self.0.trash_msg(store, uid).await
    }

    async fn close(&mut self, store: &mut Store) -> driver::Result<()> {
        self.0.close(store).await
    }

    async fn close_store(&mut self, store: Store) {
        self.0.close_store(store).await
    }
}
