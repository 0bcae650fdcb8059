use std::fmt;

use serde::{Deserialize, Serialize};

/// One side of a channel.
///
/// Operations directed at the master side are pushed, operations
/// directed at the slave side are pulled.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    Master,
    Slave,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Master, Side::Slave];

    pub fn opposite(self) -> Self {
        match self {
            Self::Master => Self::Slave,
            Self::Slave => Self::Master,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Slave => write!(f, "slave"),
        }
    }
}
