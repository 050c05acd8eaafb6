//! `ICpu`: the external CPU collaborator contract (`spec.md` §1, §6).
//!
//! The 6502/65C02/65816 instruction decoder and microcode are out of
//! scope for this crate (`spec.md` §1); the bus's only collaborator on
//! that side is whatever implements this trait. This inverts the usual
//! seam between an external CPU crate and machine-owned state: instead
//! of the machine implementing a `Bus` trait an external CPU drives,
//! `Machine` is the consumer driving an external `ICpu` (the data flow
//! here is CPU-calls-bus, so the bus is a concrete type fully specified
//! by this crate, while the CPU is the pluggable side).

use crate::bus::PagedBus;
use crate::error::HaltReason;
use crate::signals::SignalBus;
use crate::traps::{EventContext, TrapRegistry};

/// What happened during one `ICpu::step` call (`spec.md` §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Ordinary instruction execution; the run loop should keep going.
    Normal,
    /// The CPU executed a wait-for-interrupt instruction (e.g. 6502
    /// `WAI` on 65C02, or a busy-wait the CPU models explicitly); the
    /// run loop should fast-forward the scheduler instead of stepping
    /// uselessly (`spec.md` §4.8 run loop).
    WaitingForInterrupt,
    /// The CPU halted (e.g. `STP`); the machine transitions to Stopped.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub cycles_consumed: u64,
}

/// The CPU contract `Machine` drives. Implementations own their own
/// registers and decode loop; they read and write memory exclusively
/// through the `PagedBus` handed to `step`, sample interrupt lines
/// through `SignalBus`, and consult `TrapRegistry` at instruction-fetch
/// addresses so known ROM entry points can be diverted to host code
/// instead of being simulated (`spec.md` §4.7).
pub trait ICpu: std::fmt::Debug {
    /// Execute exactly one instruction (or, for `WaitingForInterrupt`,
    /// recognize that no forward progress is possible until a signal
    /// changes). `ctx.cycle` reflects the scheduler's `now` at entry;
    /// callers update it from the returned `cycles_consumed` afterward.
    fn step(
        &mut self,
        bus: &mut PagedBus,
        signals: &mut SignalBus,
        traps: &mut TrapRegistry,
        ctx: &EventContext,
    ) -> StepResult;

    /// CPU-side reset: program counter loaded from the reset vector,
    /// registers to their power-on state. Bus/device reset is the
    /// machine's responsibility, not the CPU's.
    fn reset(&mut self, bus: &mut PagedBus);

    /// Set after a run loop iteration catches a fatal runtime failure
    /// that originated inside a CPU step (e.g. a target panicked on an
    /// out-of-bounds access). `None` while running normally.
    fn halt_reason(&self) -> Option<HaltReason>;
}
