//! ID and range newtypes for the node arena.
//!
//! Every side table of [`NodeArena`](crate::NodeArena) gets its own index
//! type so a label can never be used where a variable is expected.

use std::fmt;

/// Convert a table length into a `u32` index, panicking on overflow.
///
/// Arenas beyond four billion entries indicate a runaway lowering, not a
/// legitimate program.
#[inline]
pub(crate) fn to_u32(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("arena overflow: too many {what}"))
}

/// Convert a list length into a `u16` range length, panicking on overflow.
#[inline]
pub(crate) fn to_u16(len: usize, what: &str) -> u16 {
    u16::try_from(len).unwrap_or_else(|_| panic!("arena overflow: {what} longer than u16::MAX"))
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "absent" (no else branch, no label, static call).
            pub const INVALID: $name = $name(u32::MAX);

            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if *self == Self::INVALID {
                    write!(f, concat!(stringify!($name), "::INVALID"))
                } else {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

macro_rules! define_range {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
        pub struct $name {
            pub start: u32,
            pub len: u16,
        }

        impl $name {
            pub const EMPTY: Self = Self { start: 0, len: 0 };

            #[inline]
            pub const fn new(start: u32, len: u16) -> Self {
                Self { start, len }
            }

            #[inline]
            pub const fn is_empty(&self) -> bool {
                self.len == 0
            }

            #[inline]
            pub const fn len(&self) -> usize {
                self.len as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({}..{})"),
                    self.start,
                    self.start + u32::from(self.len)
                )
            }
        }
    };
}

define_id!(
    /// Index of a node in a [`NodeArena`](crate::NodeArena). Node identity.
    NodeId
);
define_id!(
    /// Index of a declared variable (block local, lambda parameter, range variable).
    VarId
);
define_id!(
    /// Index of a jump target.
    LabelId
);
define_id!(
    /// Index of an extension payload.
    ExtId
);
define_id!(
    /// Index of a mutable slot, the single re-targetable reference in the algebra.
    SlotId
);

define_range!(
    /// Contiguous run of node ids (call arguments, block statements, array elements).
    NodeRange
);
define_range!(
    /// Contiguous run of variable ids (block variables, lambda parameters).
    VarRange
);
define_range!(
    /// Contiguous run of catch handlers.
    CatchRange
);
