//! Arena indices for nodes, devices and channels.
//!
//! Each id is a newtype around the position of the entity in the
//! `Topology` arena rather than a bare integer, so a device index can
//! never be passed where a node index is expected.

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn new(raw: u32) -> Self {
                $name(raw)
            }

            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// A simulated host or gateway.
    NodeId,
    "N"
);

arena_id!(
    /// A network interface owned by exactly one node.
    DeviceId,
    "D"
);

arena_id!(
    /// A point-to-point link, shared bus or wireless cell.
    ChannelId,
    "C"
);
