//! # State
//!
//! Module dedicated to the persisted synchronization state: the
//! per-installation correlation token, and per channel the last
//! synchronized position, the UID validity markers and the sync
//! records.
//!
//! The state lives in a TOML file. Saving writes a temporary file
//! next to it then renames it, so that a crash never leaves a
//! truncated state behind.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    result,
};

use advisory_lock::{AdvisoryFileLock, FileLockError, FileLockMode};
use chrono::{DateTime, Local};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::record::SyncRecords;

/// The length of the correlation token.
pub const TOKEN_LEN: usize = 24;

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot get state data directory")]
    GetDataDirectoryError,
    #[error("cannot read state file {1:?}")]
    ReadStateError(#[source] io::Error, PathBuf),
    #[error("cannot parse state file {1:?}")]
    ParseStateError(#[source] toml::de::Error, PathBuf),
    #[error("cannot serialize state")]
    SerializeStateError(#[source] toml::ser::Error),
    #[error("cannot create state directory {1:?}")]
    CreateStateDirectoryError(#[source] io::Error, PathBuf),
    #[error("cannot write state file {1:?}")]
    WriteStateError(#[source] io::Error, PathBuf),
    #[error("cannot use invalid correlation token {0:?} from state file {1:?}")]
    InvalidTokenError(String, PathBuf),

    #[error("cannot open state lock file {1:?}")]
    OpenLockFileError(#[source] io::Error, PathBuf),
    #[error("cannot lock state file {1:?}")]
    LockFileError(#[source] FileLockError, PathBuf),
    #[error("cannot unlock state file {1:?}")]
    UnlockFileError(#[source] FileLockError, PathBuf),
}

/// Generates a new random correlation token.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Whether the given token could have been generated by
/// [`generate_token`].
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

/// The synchronization state of one channel.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelState {
    /// The last synchronized position: the date of the last
    /// synchronization pass, or the timestamp of the last event
    /// backed up from a message source.
    #[serde(default)]
    pub last_sync: Option<DateTime<Local>>,

    /// The identifiers of the events backed up at the
    /// [`ChannelState::last_sync`] timestamp.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_ids: Vec<String>,

    #[serde(default)]
    pub master_uid_validity: Option<u32>,

    #[serde(default)]
    pub slave_uid_validity: Option<u32>,

    #[serde(default)]
    pub records: SyncRecords,
}

/// The synchronization state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncState {
    /// The random per-installation correlation token, stable across
    /// runs.
    pub token: String,

    #[serde(default)]
    pub channels: BTreeMap<String, ChannelState>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    /// Creates a fresh state with a newly generated token.
    pub fn new() -> Self {
        Self {
            token: generate_token(),
            channels: BTreeMap::new(),
        }
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelState> {
        self.channels.get(name)
    }

    /// Gets the state of the given channel, creating it when missing.
    pub fn channel_mut(&mut self, name: &str) -> &mut ChannelState {
        self.channels.entry(name.to_owned()).or_default()
    }

    /// Drops dead records of every channel.
    pub fn compact(&mut self) {
        for channel in self.channels.values_mut() {
            channel.records.compact();
        }
    }
}

/// The state file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default state file path, under the data directory of the
    /// user.
    pub fn find_default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("mailsync").join("state.toml"))
    }

    pub fn try_default() -> Result<Self> {
        Self::find_default_path()
            .map(Self::new)
            .ok_or(Error::GetDataDirectoryError)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state, or `None` when the file does not exist yet.
    pub async fn load(&self) -> Result<Option<SyncState>> {
        let path = &self.path;

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("state file {path:?} not found");
                return Ok(None);
            }
            Err(err) => return Err(Error::ReadStateError(err, path.clone())),
        };

        let state: SyncState =
            toml::from_str(&content).map_err(|err| Error::ParseStateError(err, path.clone()))?;

        if !is_valid_token(&state.token) {
            return Err(Error::InvalidTokenError(state.token, path.clone()));
        }

        Ok(Some(state))
    }

    /// Loads the state, or creates a fresh one on first run.
    ///
    /// The boolean tells whether the state is a fresh one.
    pub async fn load_or_init(&self) -> Result<(SyncState, bool)> {
        match self.load().await? {
            Some(state) => Ok((state, false)),
            None => {
                info!("first synchronization, generating a new correlation token");
                Ok((SyncState::new(), true))
            }
        }
    }

    /// Saves the state, dropping dead records first.
    pub async fn save(&self, state: &mut SyncState) -> Result<()> {
        let path = &self.path;

        state.compact();
        let content = toml::to_string(state).map_err(Error::SerializeStateError)?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| Error::CreateStateDirectoryError(err, dir.to_owned()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");

        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|err| Error::WriteStateError(err, tmp_path.clone()))?;

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|err| Error::WriteStateError(err, path.clone()))?;

        debug!("state saved to {path:?}");
        Ok(())
    }

    /// Locks the state file, so that two runs never mutate the same
    /// state at the same time.
    pub fn lock(&self) -> Result<StateLock> {
        let path = self.path.with_extension("lock");

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|err| Error::CreateStateDirectoryError(err, dir.to_owned()))?;
        }

        debug!("locking state file {path:?}");
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| Error::OpenLockFileError(err, path.clone()))?;
        AdvisoryFileLock::try_lock(&file, FileLockMode::Exclusive)
            .map_err(|err| Error::LockFileError(err, path.clone()))?;

        Ok(StateLock { file, path })
    }
}

/// An exclusive lock held on a state file.
#[derive(Debug)]
pub struct StateLock {
    file: fs::File,
    path: PathBuf,
}

impl StateLock {
    pub fn unlock(self) -> Result<()> {
        debug!("unlocking state file {:?}", self.path);
        AdvisoryFileLock::unlock(&self.file)
            .map_err(|err| Error::UnlockFileError(err, self.path))
    }
}
