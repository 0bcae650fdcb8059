//! # Flag
//!
//! Module dedicated to message flags.
//!
//! A store only knows a fixed, ordered set of flags. Each flag owns
//! one bit of a [`Flags`] set and one letter of the canonical
//! alphabet `DFRST`, which is the textual form used to persist flag
//! snapshots.

use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign, Sub},
    result,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build flags from undefined bits {0:#07b}")]
    UndefinedBitsError(u8),
    #[error("cannot parse unknown flag {0}")]
    ParseFlagError(String),
    #[error("cannot parse unknown flag letter {0}")]
    ParseFlagLetterError(char),
}

/// The message flag.
///
/// Variants are declared in canonical order: the position of a
/// variant is the position of its bit in a [`Flags`] set and the
/// position of its letter in the canonical alphabet.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Flag {
    /// The message is marked for deletion.
    Deleted,

    /// The message is bookmarked (important, starred, to check…).
    Flagged,

    /// The message has been replied to.
    Answered,

    /// The message has been opened.
    Seen,

    /// The message is a draft.
    Draft,
}

impl Flag {
    /// All flags, in canonical order.
    pub const ALL: [Flag; 5] = [
        Flag::Deleted,
        Flag::Flagged,
        Flag::Answered,
        Flag::Seen,
        Flag::Draft,
    ];

    /// The letter of the flag in the canonical alphabet.
    pub const fn letter(self) -> char {
        match self {
            Flag::Deleted => 'D',
            Flag::Flagged => 'F',
            Flag::Answered => 'R',
            Flag::Seen => 'S',
            Flag::Draft => 'T',
        }
    }

    /// The bit owned by the flag inside a [`Flags`] set.
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl TryFrom<char> for Flag {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        Flag::ALL
            .into_iter()
            .find(|flag| flag.letter() == c)
            .ok_or(Error::ParseFlagLetterError(c))
    }
}

/// Parse a flag from its name.
impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            seen if seen.eq_ignore_ascii_case("seen") => Ok(Flag::Seen),
            answered if answered.eq_ignore_ascii_case("answered") => Ok(Flag::Answered),
            replied if replied.eq_ignore_ascii_case("replied") => Ok(Flag::Answered),
            flagged if flagged.eq_ignore_ascii_case("flagged") => Ok(Flag::Flagged),
            deleted if deleted.eq_ignore_ascii_case("deleted") => Ok(Flag::Deleted),
            draft if draft.eq_ignore_ascii_case("draft") => Ok(Flag::Draft),
            unknown => Err(Error::ParseFlagError(unknown.to_owned())),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = match self {
            Flag::Deleted => "deleted",
            Flag::Flagged => "flagged",
            Flag::Answered => "answered",
            Flag::Seen => "seen",
            Flag::Draft => "draft",
        };
        write!(f, "{flag}")
    }
}

/// The set of message flags.
///
/// Stored as a bitmask where only the bits of [`Flag::ALL`] may be
/// set. Serialized as its canonical letters (see
/// [`Flags::encode`]).
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub struct Flags(u8);

impl Flags {
    /// The bits that may be set in a flags set.
    pub const MASK: u8 = 0b1_1111;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(Self::MASK)
    }

    /// Builds a flags set from raw bits, refusing undefined bits.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::MASK != 0 {
            return Err(Error::UndefinedBitsError(bits));
        }

        Ok(Self(bits))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn insert(&mut self, flag: Flag) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: Flag) {
        self.0 &= !flag.bit();
    }

    pub fn with(mut self, flag: Flag) -> Self {
        self.insert(flag);
        self
    }

    pub fn without(mut self, flag: Flag) -> Self {
        self.remove(flag);
        self
    }

    /// Iterates over the flags of the set, in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.into_iter().filter(move |flag| self.contains(*flag))
    }

    /// Decodes flags from their canonical letters.
    ///
    /// The canonical alphabet is scanned in order against the
    /// letters of the text: a letter only registers when it shows up
    /// at its canonical position, so letters must be given in
    /// canonical order. Characters outside of the alphabet are
    /// skipped.
    pub fn decode(text: &str) -> Self {
        let mut letters = text
            .chars()
            .filter(|c| Flag::try_from(*c).is_ok())
            .peekable();
        let mut flags = Self::empty();

        for flag in Flag::ALL {
            if letters.peek() == Some(&flag.letter()) {
                flags.insert(flag);
                letters.next();
            }
        }

        if letters.peek().is_some() {
            trace!("ignoring out of order flag letters in {text:?}");
        }

        flags
    }

    /// Encodes flags as their canonical letters, in canonical order.
    pub fn encode(self) -> String {
        self.iter().map(Flag::letter).collect()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl From<Flag> for Flags {
    fn from(flag: Flag) -> Self {
        Self(flag.bit())
    }
}

impl From<&str> for Flags {
    fn from(text: &str) -> Self {
        Self::decode(text)
    }
}

impl From<String> for Flags {
    fn from(text: String) -> Self {
        Self::decode(&text)
    }
}

impl From<Flags> for String {
    fn from(flags: Flags) -> Self {
        flags.encode()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Set difference.
impl Sub for Flags {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}
