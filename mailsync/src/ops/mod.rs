//! # Operations
//!
//! Module dedicated to synchronization operations: what has to be
//! synchronized, and in which direction.
//!
//! A channel owns two [`Operations`] sets. The master set holds the
//! operations applied to the master store (pushed from the slave),
//! the slave set holds the operations applied to the slave store
//! (pulled from the master). Sets are built by merging directive
//! layers (defaults, configuration, command line) with [`merge`].

use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign, Sub},
    result,
    str::FromStr,
};

use thiserror::Error;
use tracing::debug;

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("conflicting {0} directives specified")]
    ConflictError(OperationClass),
    #[error("cannot parse unknown sync directive {0}")]
    ParseDirectiveError(String),
}

/// The class of operations a conflict belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationClass {
    /// New, renew, delete and flags operations.
    Type,
    Expunge,
    Create,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "sync"),
            Self::Expunge => write!(f, "expunge"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// A set of synchronization operations.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Operations(u16);

impl Operations {
    /// Propagate new messages.
    pub const NEW: Self = Self(1 << 0);
    /// Propagate messages that could not be propagated before.
    pub const RENEW: Self = Self(1 << 1);
    /// Propagate deletions.
    pub const DELETE: Self = Self(1 << 2);
    /// Propagate flag changes.
    pub const FLAGS: Self = Self(1 << 3);
    /// Every type operation.
    pub const MASK_TYPE: Self = Self(0b1111);

    /// Physically remove deleted messages.
    pub const EXPUNGE: Self = Self(1 << 4);
    /// Create missing mailboxes.
    pub const CREATE: Self = Self(1 << 5);

    /// Directive direction: slave to master.
    pub const PUSH: Self = Self(1 << 6);
    /// Directive direction: master to slave.
    pub const PULL: Self = Self(1 << 7);
    pub const MASK_DIR: Self = Self(Self::PUSH.0 | Self::PULL.0);

    /// A type directive has been explicitly given, possibly `None`.
    pub const HAVE_TYPE: Self = Self(1 << 8);
    /// An expunge directive has been explicitly given.
    pub const HAVE_EXPUNGE: Self = Self(1 << 9);
    /// A create directive has been explicitly given.
    pub const HAVE_CREATE: Self = Self(1 << 10);

    const MASK: u16 = (1 << 11) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u16) -> Option<Self> {
        if bits & !Self::MASK == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether all the bits of `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether at least one bit of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// The type operations of the set (new, renew, delete, flags).
    pub fn types(self) -> Self {
        self & Self::MASK_TYPE
    }

    /// The set stripped from directions and explicit markers.
    pub fn operations(self) -> Self {
        self & (Self::MASK_TYPE | Self::EXPUNGE | Self::CREATE)
    }

    /// Builds the expunge directive of a layer.
    pub fn expunge(enable: bool) -> Self {
        if enable {
            Self::HAVE_EXPUNGE | Self::EXPUNGE
        } else {
            Self::HAVE_EXPUNGE
        }
    }

    /// Builds the create directive of a layer.
    pub fn create(enable: bool) -> Self {
        if enable {
            Self::HAVE_CREATE | Self::CREATE
        } else {
            Self::HAVE_CREATE
        }
    }
}

impl BitOr for Operations {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Operations {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Operations {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Sub for Operations {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}

/// Parses a sync directive made of whitespace-separated keywords
/// among `None`, `All`, `Pull`, `Push`, `New`, `ReNew`, `Delete` and
/// `Flags` (case insensitive).
///
/// The result always carries [`Operations::HAVE_TYPE`], so that
/// `None` can be told apart from an absent directive.
impl FromStr for Operations {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split_whitespace()
            .try_fold(Self::HAVE_TYPE, |ops, keyword| {
                let op = match keyword {
                    k if k.eq_ignore_ascii_case("none") => Self::empty(),
                    k if k.eq_ignore_ascii_case("all") => Self::MASK_DIR,
                    k if k.eq_ignore_ascii_case("pull") => Self::PULL,
                    k if k.eq_ignore_ascii_case("push") => Self::PUSH,
                    k if k.eq_ignore_ascii_case("new") => Self::NEW,
                    k if k.eq_ignore_ascii_case("renew") => Self::RENEW,
                    k if k.eq_ignore_ascii_case("delete") => Self::DELETE,
                    k if k.eq_ignore_ascii_case("flags") => Self::FLAGS,
                    unknown => return Err(Error::ParseDirectiveError(unknown.to_owned())),
                };
                Ok(ops | op)
            })
    }
}

impl fmt::Display for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::NEW, "new"),
            (Self::RENEW, "renew"),
            (Self::DELETE, "delete"),
            (Self::FLAGS, "flags"),
            (Self::EXPUNGE, "expunge"),
            (Self::CREATE, "create"),
            (Self::PUSH, "push"),
            (Self::PULL, "pull"),
        ];

        let mut names = names
            .into_iter()
            .filter(|(op, _)| self.contains(*op))
            .map(|(_, name)| name)
            .peekable();

        if names.peek().is_none() {
            return write!(f, "none");
        }

        for (i, name) in names.enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
        }

        Ok(())
    }
}

/// Merges a directive layer into the accumulated master and slave
/// operations.
///
/// Type directives (new, renew, delete, flags) are handled as
/// follows:
///
/// - A direction without type means every type.
/// - A directed type goes to the side(s) named by the direction. It
///   conflicts when the opposite side already claims the type from
///   an earlier layer: a type is pushed or pulled, never both from
///   independent layers.
/// - A directionless type goes to both sides. It conflicts when
///   either side already claims it, since it would make the type
///   pushed and pulled at once.
///
/// A type may thus be re-asserted by several layers only when they
/// all direct it to the same single side. The first layer giving a
/// type directive cannot conflict, and the outcome does not depend
/// on the order of the layers.
///
/// Expunge and create directives apply to both sides. Once such a
/// directive has been recorded, a later layer enabling the same
/// operation again is a conflict.
///
/// Explicit markers (`HAVE_*`) are recorded in the master set.
pub fn merge(
    layer: Operations,
    master: Operations,
    slave: Operations,
) -> Result<(Operations, Operations)> {
    use Operations as Op;

    let (mut master, mut slave) = (master, slave);
    let accumulated = master | slave;

    if layer.contains(Op::HAVE_TYPE) {
        let first = !accumulated.contains(Op::HAVE_TYPE);
        let dirs = layer & Op::MASK_DIR;
        let mut types = layer.types();

        if types.is_empty() && !dirs.is_empty() {
            types = Op::MASK_TYPE;
        }

        if dirs.is_empty() {
            if !first && accumulated.intersects(types) {
                debug!("{types} directive already claimed by an earlier layer");
                return Err(Error::ConflictError(OperationClass::Type));
            }
            master |= types;
            slave |= types;
        } else {
            let push = dirs.contains(Op::PUSH);
            let pull = dirs.contains(Op::PULL);

            if !first && push && slave.intersects(types) {
                debug!("cannot push {types}: already pulled by an earlier layer");
                return Err(Error::ConflictError(OperationClass::Type));
            }

            if !first && pull && master.intersects(types) {
                debug!("cannot pull {types}: already pushed by an earlier layer");
                return Err(Error::ConflictError(OperationClass::Type));
            }

            if push {
                master |= types;
            }

            if pull {
                slave |= types;
            }
        }

        master |= Op::HAVE_TYPE;
    }

    for (have, op, class) in [
        (Op::HAVE_EXPUNGE, Op::EXPUNGE, OperationClass::Expunge),
        (Op::HAVE_CREATE, Op::CREATE, OperationClass::Create),
    ] {
        if !layer.contains(have) {
            continue;
        }

        if accumulated.contains(have) && accumulated.intersects(layer & op) {
            return Err(Error::ConflictError(class));
        }

        master |= (layer & op) | have;
        slave |= layer & op;
    }

    Ok((master, slave))
}

/// Resolves the master and slave operations of a channel by merging
/// the given layers in order.
///
/// When no layer gives any type directive, every type is synchronized
/// in both directions.
pub fn resolve(
    layers: impl IntoIterator<Item = Operations>,
) -> Result<(Operations, Operations)> {
    let (master, slave) = layers
        .into_iter()
        .try_fold((Operations::empty(), Operations::empty()), |(m, s), layer| {
            merge(layer, m, s)
        })?;

    if master.contains(Operations::HAVE_TYPE) {
        Ok((master, slave))
    } else {
        let all = Operations::MASK_TYPE;
        Ok((master | all, slave | all))
    }
}

#[cfg(test)]
mod tests {
    use super::{merge, resolve, Error, OperationClass, Operations as Op};

    fn parse(s: &str) -> Op {
        s.parse().unwrap()
    }

    fn apply(layers: &[Op]) -> super::Result<(Op, Op)> {
        layers
            .iter()
            .try_fold((Op::empty(), Op::empty()), |(m, s), layer| {
                merge(*layer, m, s)
            })
    }

    fn permutations(items: &[Op]) -> Vec<Vec<Op>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }

        let mut perms = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let item = rest.remove(i);
            for mut perm in permutations(&rest) {
                perm.insert(0, item);
                perms.push(perm);
            }
        }
        perms
    }

    #[test]
    fn parse_directives() {
        assert_eq!(parse("None"), Op::HAVE_TYPE);
        assert_eq!(parse("pull new"), Op::HAVE_TYPE | Op::PULL | Op::NEW);
        assert_eq!(parse("All"), Op::HAVE_TYPE | Op::PUSH | Op::PULL);
        assert_eq!(
            "Pull Junk".parse::<Op>(),
            Err(Error::ParseDirectiveError("Junk".into()))
        );
    }

    #[test]
    fn pull_new_push_new_in_one_layer() {
        let (master, slave) = apply(&[parse("Pull New Push New")]).unwrap();
        assert_eq!(master.types(), Op::NEW);
        assert_eq!(slave.types(), Op::NEW);
    }

    #[test]
    fn push_then_pull_same_type_conflicts() {
        assert_eq!(
            apply(&[parse("Push New"), parse("Pull New")]),
            Err(Error::ConflictError(OperationClass::Type))
        );
        assert_eq!(
            apply(&[parse("Pull Flags"), parse("Push Flags")]),
            Err(Error::ConflictError(OperationClass::Type))
        );
    }

    #[test]
    fn reassert_type_claimed_by_both_sides_conflicts() {
        let (master, slave) = apply(&[parse("Pull New Push New")]).unwrap();
        assert_eq!(
            merge(parse("Push New"), master, slave),
            Err(Error::ConflictError(OperationClass::Type))
        );
        assert_eq!(
            merge(parse("New"), master, slave),
            Err(Error::ConflictError(OperationClass::Type))
        );
    }

    #[test]
    fn non_overlapping_layers_merge() {
        let (master, slave) =
            apply(&[parse("Push New"), parse("Pull Flags"), parse("Push Delete")]).unwrap();
        assert_eq!(master.types(), Op::NEW | Op::DELETE);
        assert_eq!(slave.types(), Op::FLAGS);

        // re-asserting a type on the side already claiming it is fine
        let (master, slave) = merge(parse("Push New"), master, slave).unwrap();
        assert_eq!(master.types(), Op::NEW | Op::DELETE);
        assert_eq!(slave.types(), Op::FLAGS);
    }

    #[test]
    fn directionless_type_goes_to_both_sides() {
        let (master, slave) = apply(&[parse("Push New"), parse("Flags")]).unwrap();
        assert_eq!(master.types(), Op::NEW | Op::FLAGS);
        assert_eq!(slave.types(), Op::FLAGS);

        // whatever the order, new cannot be both pushed and undirected
        assert_eq!(
            apply(&[parse("Push New"), parse("New")]),
            Err(Error::ConflictError(OperationClass::Type))
        );
        assert_eq!(
            apply(&[parse("New"), parse("Push New")]),
            Err(Error::ConflictError(OperationClass::Type))
        );
    }

    #[test]
    fn direction_without_type_means_all_types() {
        let (master, slave) = apply(&[parse("Pull")]).unwrap();
        assert_eq!(master.types(), Op::empty());
        assert_eq!(slave.types(), Op::MASK_TYPE);

        assert_eq!(
            merge(parse("Push"), master, slave),
            Err(Error::ConflictError(OperationClass::Type))
        );
    }

    #[test]
    fn layer_without_type_directive_inherits() {
        let (master, slave) = apply(&[parse("Push New"), Op::expunge(true)]).unwrap();
        assert_eq!(master.types(), Op::NEW);
        assert!(master.contains(Op::EXPUNGE));
        assert!(slave.contains(Op::EXPUNGE));
    }

    #[test]
    fn expunge_and_create_conflicts() {
        assert_eq!(
            apply(&[Op::expunge(true), Op::expunge(true)]),
            Err(Error::ConflictError(OperationClass::Expunge))
        );
        assert_eq!(
            apply(&[Op::create(true), Op::create(true)]),
            Err(Error::ConflictError(OperationClass::Create))
        );
        assert!(apply(&[Op::expunge(false), Op::expunge(true)]).is_ok());
        assert!(apply(&[Op::expunge(true), Op::create(true)]).is_ok());
    }

    /// Every directive combining up to two types with every
    /// direction, plus expunge and create directives.
    fn directives() -> Vec<Op> {
        let mut directives = vec![
            parse("None"),
            Op::expunge(true),
            Op::expunge(false),
            Op::create(true),
        ];

        for dir in ["", "Push", "Pull", "Push Pull"] {
            for types in ["", "New", "Flags", "New Flags"] {
                if !dir.is_empty() || !types.is_empty() {
                    directives.push(parse(&format!("{dir} {types}")));
                }
            }
        }

        directives
    }

    #[test]
    fn merge_is_confluent() {
        let directives = directives();

        for (i, a) in directives.iter().enumerate() {
            for (j, b) in directives.iter().enumerate().skip(i + 1) {
                for c in directives.iter().skip(j + 1) {
                    let layers = [*a, *b, *c];
                    let expected = apply(&layers);

                    for perm in permutations(&layers) {
                        let result = apply(&perm);
                        match (&result, &expected) {
                            (Ok(result), Ok(expected)) => assert_eq!(result, expected, "{perm:?}"),
                            (Err(_), Err(_)) => (),
                            _ => panic!("{perm:?}: {result:?} differs from {expected:?}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn merge_is_confluent_over_conflict_free_layers() {
        let layers = [
            parse("Push New"),
            parse("Pull Flags"),
            parse("Push Delete"),
            parse("Push New"),
            Op::expunge(true),
            Op::create(true),
        ];

        let expected = apply(&layers).unwrap();

        for perm in permutations(&layers) {
            assert_eq!(apply(&perm).unwrap(), expected, "{perm:?}");
        }
    }

    #[test]
    fn resolve_defaults_to_all() {
        let (master, slave) = resolve([]).unwrap();
        assert_eq!(master.types(), Op::MASK_TYPE);
        assert_eq!(slave.types(), Op::MASK_TYPE);

        let (master, slave) = resolve([parse("None")]).unwrap();
        assert_eq!(master.types(), Op::empty());
        assert_eq!(slave.types(), Op::empty());
    }
}
