use std::num::NonZero;

/// Define an ID type which indexes into one of a [`Graph`](super::Graph)'s
/// arenas.
///
/// IDs are u32 values <= `i32::MAX`. They are stored offset by one so that
/// `Option<Id>` is the same size as `Id`.
macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(NonZero<u32>);

        impl $name {
            /// Return the underlying u32 value of the ID.
            pub fn as_u32(self) -> u32 {
                self.0.get() - 1
            }

            /// Return the underlying ID value as a usize, for slice indexing.
            pub fn as_usize(self) -> usize {
                self.as_u32() as usize
            }

            /// Construct an ID from an arena index.
            ///
            /// Panics if the index exceeds `i32::MAX`.
            pub(crate) fn from_usize(index: usize) -> Self {
                let value = u32::try_from(index)
                    .ok()
                    .filter(|val| *val <= i32::MAX as u32)
                    .and_then(|val| NonZero::new(val + 1))
                    .expect("arena index out of range");
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.as_u32())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.as_u32())
            }
        }
    };
}

arena_id!(
    /// ID of an operation in a [`Graph`](super::Graph).
    NodeId,
    "#"
);

arena_id!(
    /// ID of a value produced by a node or passed as a block parameter.
    ValueId,
    "%"
);

arena_id!(
    /// ID of a block, an ordered list of nodes with parameters and return
    /// values.
    BlockId,
    "^"
);
