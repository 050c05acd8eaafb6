//! The calling convention between a CPU (or any other bus master) and
//! the bus (`spec.md` §6).

use bitflags::bitflags;

use crate::addr::{Addr, Cycle};
use crate::perms::Intent;

bitflags! {
    /// Per-access modifiers a caller can set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u8 {
        /// Suppress side effects (used internally by peek/poke).
        const NO_SIDE_EFFECTS = 1 << 0;
        /// Force byte-wise decomposition even if the whole access would
        /// resolve to a single SupportsWide target.
        const DECOMPOSE = 1 << 1;
        /// Require natural alignment; unaligned wide accesses fault
        /// instead of silently decomposing.
        const ALIGN_CHECK = 1 << 2;
    }
}

/// The single struct every bus call takes. `width_bits` is informational
/// on `read8`/`write8` etc. (the method name already fixes width); it
/// matters for the generic `try_read`/`try_write` entry points and for
/// trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAccess {
    pub address: Addr,
    pub width_bits: u8,
    pub intent: Intent,
    pub source_id: i32,
    pub cycle: Cycle,
    pub flags: AccessFlags,
}

impl BusAccess {
    #[must_use]
    pub fn fetch(address: Addr, source_id: i32, cycle: Cycle) -> Self {
        Self {
            address,
            width_bits: 8,
            intent: Intent::InstructionFetch,
            source_id,
            cycle,
            flags: AccessFlags::empty(),
        }
    }

    #[must_use]
    pub fn data_read(address: Addr, source_id: i32, cycle: Cycle) -> Self {
        Self {
            address,
            width_bits: 8,
            intent: Intent::DataRead,
            source_id,
            cycle,
            flags: AccessFlags::empty(),
        }
    }

    #[must_use]
    pub fn data_write(address: Addr, source_id: i32, cycle: Cycle) -> Self {
        Self {
            address,
            width_bits: 8,
            intent: Intent::DataWrite,
            source_id,
            cycle,
            flags: AccessFlags::empty(),
        }
    }

    #[must_use]
    pub fn dma_read(address: Addr, source_id: i32, cycle: Cycle) -> Self {
        Self {
            address,
            width_bits: 8,
            intent: Intent::DmaRead,
            source_id,
            cycle,
            flags: AccessFlags::empty(),
        }
    }

    #[must_use]
    pub fn dma_write(address: Addr, source_id: i32, cycle: Cycle) -> Self {
        Self {
            address,
            width_bits: 8,
            intent: Intent::DmaWrite,
            source_id,
            cycle,
            flags: AccessFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_width(mut self, width_bits: u8) -> Self {
        self.width_bits = width_bits;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = flags;
        self
    }
}
