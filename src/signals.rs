//! The signal bus: refcounted assertion of CPU signal lines plus CPU
//! instrumentation counters (`spec.md` §4.6).
//!
//! Generalizes ICR/IDR-style masked interrupt latching for a single
//! chip's IRQ line to "any line, refcounted by however many devices are
//! asserting it right now". The "edge flag kept separate from level"
//! shape NMI needs here is the same shape an interrupt-data-register
//! latch bit plays for old-style CIA interrupt sources. Instrumentation
//! counters are plain atomics per the Design Notes (`spec.md` §9):
//! "kept separate from assertion state because they count forward
//! monotonically and are read by UI threads".

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::addr::Cycle;
use crate::ids::DeviceId;

/// CPU signal lines a device can assert or clear (`spec.md` §2 C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalLine {
    Irq,
    Nmi,
    Reset,
    Rdy,
    DmaReq,
    BusEnable,
}

const LINE_COUNT: usize = 6;

impl SignalLine {
    fn index(self) -> usize {
        match self {
            SignalLine::Irq => 0,
            SignalLine::Nmi => 1,
            SignalLine::Reset => 2,
            SignalLine::Rdy => 3,
            SignalLine::DmaReq => 4,
            SignalLine::BusEnable => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleState {
    Asserted,
    Clear,
}

impl SampleState {
    #[must_use]
    pub fn is_asserted(self) -> bool {
        matches!(self, SampleState::Asserted)
    }
}

/// Inter-device signaling fabric. Assertion sets are mutated only from
/// the emulator thread; the bitmask snapshot and instrumentation
/// counters are atomics so other threads can sample them without a lock
/// (`spec.md` §5).
#[derive(Debug)]
pub struct SignalBus {
    asserting: [HashSet<DeviceId>; LINE_COUNT],
    asserted_mask: AtomicU8,
    nmi_edge_latch: AtomicBool,
    fetch_cycles: AtomicU64,
    execute_cycles: AtomicU64,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            asserting: Default::default(),
            asserted_mask: AtomicU8::new(0),
            nmi_edge_latch: AtomicBool::new(false),
            fetch_cycles: AtomicU64::new(0),
            execute_cycles: AtomicU64::new(0),
        }
    }

    /// Add `device` to the line's asserting set. Idempotent for the
    /// same device. A `None -> Asserted` transition on `Nmi` latches the
    /// edge flag.
    pub fn assert(&mut self, line: SignalLine, device: DeviceId, _cycle: Cycle) {
        let idx = line.index();
        let was_empty = self.asserting[idx].is_empty();
        self.asserting[idx].insert(device);
        if was_empty {
            self.asserted_mask.fetch_or(1 << idx, Ordering::Relaxed);
            if matches!(line, SignalLine::Nmi) {
                self.nmi_edge_latch.store(true, Ordering::Relaxed);
            }
            log::trace!("signal {line:?} asserted by {device}");
        }
    }

    /// Remove `device` from the line's asserting set. No-op if absent
    /// (`spec.md` §8 invariant 7).
    pub fn clear(&mut self, line: SignalLine, device: DeviceId, _cycle: Cycle) {
        let idx = line.index();
        if self.asserting[idx].remove(&device) && self.asserting[idx].is_empty() {
            self.asserted_mask.fetch_and(!(1 << idx), Ordering::Relaxed);
            log::trace!("signal {line:?} cleared by {device}, line now clear");
        }
    }

    /// `Asserted` iff the line's assertion set is non-empty, or — for
    /// `Nmi` — the edge latch is still set (`spec.md` §4.6, §8 invariant
    /// 7). Safe to call from any thread.
    #[must_use]
    pub fn sample(&self, line: SignalLine) -> SampleState {
        let idx = line.index();
        let level = self.asserted_mask.load(Ordering::Relaxed) & (1 << idx) != 0;
        let latched = matches!(line, SignalLine::Nmi) && self.nmi_edge_latch.load(Ordering::Relaxed);
        if level || latched {
            SampleState::Asserted
        } else {
            SampleState::Clear
        }
    }

    /// Clear the NMI edge latch. The only way to clear it once set.
    pub fn acknowledge_nmi(&mut self, _cycle: Cycle) {
        self.nmi_edge_latch.store(false, Ordering::Relaxed);
    }

    /// Clear every assertion set and the NMI latch. Does not touch the
    /// instrumentation counters (`spec.md` §4.6).
    pub fn reset(&mut self) {
        for set in &mut self.asserting {
            set.clear();
        }
        self.asserted_mask.store(0, Ordering::Relaxed);
        self.nmi_edge_latch.store(false, Ordering::Relaxed);
    }

    pub fn signal_instruction_fetched(&self, cycles: u64) {
        self.fetch_cycles.fetch_add(cycles, Ordering::Relaxed);
    }

    pub fn signal_instruction_executed(&self, cycles: u64) {
        self.execute_cycles.fetch_add(cycles, Ordering::Relaxed);
    }

    pub fn reset_cycle_counters(&self) {
        self.fetch_cycles.store(0, Ordering::Relaxed);
        self.execute_cycles.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn total_cpu_cycles(&self) -> u64 {
        self.fetch_cycles.load(Ordering::Relaxed) + self.execute_cycles.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn asserting_devices(&self, line: SignalLine) -> Vec<DeviceId> {
        self.asserting[line.index()].iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV_A: DeviceId = DeviceId(1);
    const DEV_B: DeviceId = DeviceId(2);

    /// Scenario S5 — IRQ refcount (`spec.md` §8).
    #[test]
    fn scenario_s5_irq_refcount() {
        let mut bus = SignalBus::new();
        bus.assert(SignalLine::Irq, DEV_A, Cycle(0));
        bus.assert(SignalLine::Irq, DEV_B, Cycle(0));
        assert_eq!(bus.sample(SignalLine::Irq), SampleState::Asserted);
        bus.clear(SignalLine::Irq, DEV_A, Cycle(1));
        assert_eq!(bus.sample(SignalLine::Irq), SampleState::Asserted);
        bus.clear(SignalLine::Irq, DEV_B, Cycle(2));
        assert_eq!(bus.sample(SignalLine::Irq), SampleState::Clear);
    }

    /// Scenario S6 — NMI edge latch (`spec.md` §8).
    #[test]
    fn scenario_s6_nmi_edge() {
        let mut bus = SignalBus::new();
        bus.assert(SignalLine::Nmi, DEV_A, Cycle(0));
        bus.clear(SignalLine::Nmi, DEV_A, Cycle(1));
        assert_eq!(bus.sample(SignalLine::Nmi), SampleState::Asserted); // latch still set
        bus.acknowledge_nmi(Cycle(2));
        assert_eq!(bus.sample(SignalLine::Nmi), SampleState::Clear);
    }

    #[test]
    fn clear_by_non_asserting_device_is_a_no_op() {
        let mut bus = SignalBus::new();
        bus.clear(SignalLine::Irq, DEV_A, Cycle(0));
        assert_eq!(bus.sample(SignalLine::Irq), SampleState::Clear);
    }

    #[test]
    fn reset_clears_assertions_but_not_instrumentation() {
        let mut bus = SignalBus::new();
        bus.assert(SignalLine::Irq, DEV_A, Cycle(0));
        bus.signal_instruction_fetched(7);
        bus.signal_instruction_executed(3);
        bus.reset();
        assert_eq!(bus.sample(SignalLine::Irq), SampleState::Clear);
        assert_eq!(bus.total_cpu_cycles(), 10);
    }

    #[test]
    fn total_cpu_cycles_sums_fetch_and_execute() {
        let bus = SignalBus::new();
        bus.signal_instruction_fetched(4);
        bus.signal_instruction_executed(6);
        assert_eq!(bus.total_cpu_cycles(), 10);
        bus.reset_cycle_counters();
        assert_eq!(bus.total_cpu_cycles(), 0);
    }
}
