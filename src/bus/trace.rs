//! Fixed-capacity bus-access trace ring buffer (`spec.md` §4.1, §9).
//!
//! Capacity is a power of two so the write index can wrap with a
//! bitmask instead of a modulo. When full, the oldest entry is
//! overwritten and a "lost" counter increments; a reader compares
//! `total_written` against capacity to know which absolute indices are
//! still resident — the same accounting scheme the Design Notes call
//! for (`spec.md` §9).

use crate::addr::{Addr, Cycle};
use crate::ids::DeviceId;
use crate::perms::{Intent, RegionTag};

use crate::access::AccessFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub cycle: Cycle,
    pub address: Addr,
    pub value: u32,
    pub width_bits: u8,
    pub intent: Intent,
    pub flags: AccessFlags,
    pub source_id: i32,
    pub device_id: DeviceId,
    pub region_tag: RegionTag,
}

pub struct TraceBuffer {
    capacity: usize,
    mask: usize,
    slots: Vec<Option<TraceEvent>>,
    total_written: u64,
    overwritten: bool,
    enabled: bool,
}

impl TraceBuffer {
    /// `capacity` must be a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "trace buffer capacity must be a power of two");
        Self {
            capacity,
            mask: capacity - 1,
            slots: vec![None; capacity],
            total_written: 0,
            overwritten: false,
            enabled: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, event: TraceEvent) {
        if !self.enabled {
            return;
        }
        let idx = (self.total_written as usize) & self.mask;
        if self.total_written >= self.capacity as u64 {
            self.overwritten = true;
        }
        self.slots[idx] = Some(event);
        self.total_written += 1;
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    #[must_use]
    pub fn has_overwritten(&self) -> bool {
        self.overwritten
    }

    /// Resident entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        let resident = self.total_written.min(self.capacity as u64) as usize;
        let start = if self.total_written > self.capacity as u64 {
            (self.total_written as usize) & self.mask
        } else {
            0
        };
        (0..resident).map(move |i| self.slots[(start + i) & self.mask].as_ref().unwrap())
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.total_written = 0;
        self.overwritten = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(cycle: u64) -> TraceEvent {
        TraceEvent {
            cycle: Cycle(cycle),
            address: Addr::ZERO,
            value: 0,
            width_bits: 8,
            intent: Intent::DataRead,
            flags: AccessFlags::empty(),
            source_id: 0,
            device_id: DeviceId(0),
            region_tag: RegionTag::Ram,
        }
    }

    #[test]
    fn wraps_and_flags_overwritten() {
        let mut buf = TraceBuffer::new(4);
        buf.set_enabled(true);
        for i in 0..6 {
            buf.record(ev(i));
        }
        assert!(buf.has_overwritten());
        assert_eq!(buf.total_written(), 6);
        let cycles: Vec<u64> = buf.iter().map(|e| e.cycle.get()).collect();
        assert_eq!(cycles, vec![2, 3, 4, 5]);
    }

    #[test]
    fn disabled_by_default_records_nothing() {
        let mut buf = TraceBuffer::new(4);
        buf.record(ev(0));
        assert_eq!(buf.total_written(), 0);
    }
}
