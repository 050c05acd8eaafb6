//! Permission, capability, region-tag and access-intent vocabulary
//! shared by every bus target (`spec.md` §3).

use bitflags::bitflags;

bitflags! {
    /// Three-bit permission set checked on every access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        const READ    = 0b001;
        const WRITE   = 0b010;
        const EXECUTE = 0b100;
    }
}

impl Permissions {
    pub const NONE: Permissions = Permissions::empty();
    pub const RW: Permissions = Permissions::READ.union(Permissions::WRITE);
    pub const RWX: Permissions = Permissions::READ
        .union(Permissions::WRITE)
        .union(Permissions::EXECUTE);
    pub const RX: Permissions = Permissions::READ.union(Permissions::EXECUTE);
}

bitflags! {
    /// What a target declares it supports, consulted by tracing,
    /// DMA-style reads, and debugger peek/poke decisions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TargetCaps: u16 {
        const SUPPORTS_PEEK  = 1 << 0;
        const SUPPORTS_POKE  = 1 << 1;
        const SUPPORTS_WIDE  = 1 << 2;
        const HAS_SIDE_EFFECTS = 1 << 3;
        const TIMING_SENSITIVE = 1 << 4;
        const VOLATILE = 1 << 5;
    }
}

/// Region tag carried on every page and surfaced in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTag {
    Ram,
    Rom,
    Io,
    Slot,
    Unmapped,
}

/// What kind of access is being made; drives permission checks, the
/// CPU-instruction-fetch sampling point, and trap operation matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    InstructionFetch,
    DataRead,
    DataWrite,
    DmaRead,
    DmaWrite,
    PeekRead,
    PokeWrite,
}

impl Intent {
    /// The permission bit this intent must find set in a resolved page's
    /// permissions, or `None` if the intent bypasses permission checks
    /// entirely (peek/poke: capability-gated instead, never fault).
    #[must_use]
    pub fn required_permission(self) -> Option<Permissions> {
        match self {
            Intent::InstructionFetch => Some(Permissions::EXECUTE),
            Intent::DataRead | Intent::DmaRead => Some(Permissions::READ),
            Intent::DataWrite | Intent::DmaWrite => Some(Permissions::WRITE),
            Intent::PeekRead | Intent::PokeWrite => None,
        }
    }

    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Intent::DataWrite | Intent::DmaWrite | Intent::PokeWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_union_covers_rwx() {
        assert!(Permissions::RWX.contains(Permissions::READ));
        assert!(Permissions::RWX.contains(Permissions::WRITE));
        assert!(Permissions::RWX.contains(Permissions::EXECUTE));
    }

    #[test]
    fn fetch_requires_execute() {
        assert_eq!(Intent::InstructionFetch.required_permission(), Some(Permissions::EXECUTE));
    }

    #[test]
    fn peek_bypasses_permission_checks() {
        assert_eq!(Intent::PeekRead.required_permission(), None);
    }
}
