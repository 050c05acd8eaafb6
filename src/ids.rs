//! Arena-index newtypes.
//!
//! Per the Design Notes in `spec.md` §9, this core uses an
//! arena-plus-index model rather than shared mutable references: a
//! machine-owned arena holds targets, layers, and swap groups; every
//! other component refers to them by a typed index. This keeps the CPU
//! and devices holding only a handle to the machine/bus, with no cyclic
//! references to reason about.

use std::fmt;

macro_rules! index_type {
    ($name:ident, $repr:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }

        impl From<$repr> for $name {
            fn from(v: $repr) -> Self {
                $name(v)
            }
        }
    };
}

index_type!(DeviceId, i32);
index_type!(TargetId, u32);
index_type!(LayerId, u32);
index_type!(GroupId, u32);
index_type!(TrapId, u64);
index_type!(EventHandle, u64);
