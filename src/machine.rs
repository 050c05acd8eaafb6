//! The machine: composition root and lifecycle state machine
//! (`spec.md` §4.8).
//!
//! A composition root owning the CPU and every chip, driving a step
//! loop, with lifecycle commands (pause/stop) drained between steps
//! while running and observed at rest: a `{Stopped, Running, Paused}`
//! state machine with the command post expressed as atomic flags rather
//! than a channel, since `spec.md` §5 requires the emulator thread to
//! observe pause/stop at "the next safe point" without committing this
//! crate to owning its own thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bus::PagedBus;
use crate::cpu::{ICpu, StepOutcome};
use crate::device::DeviceRegistry;
use crate::error::HaltReason;
use crate::scheduler::Scheduler;
use crate::signals::SignalBus;
use crate::traps::{EventContext, TrapRegistry};

/// Upper bound, in cycles, on a single `WaitingForInterrupt`
/// fast-forward — guards against a misconfigured machine with no
/// pending events stalling the run loop forever (`spec.md` §4.8 run
/// loop: "advance the scheduler to the earlier of `next_due()` and a
/// watchdog bound").
pub const DEFAULT_WATCHDOG_CYCLES: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Stopped,
    Running,
    Paused,
}

pub trait MachineObserver {
    fn state_changed(&mut self, _from: MachineState, _to: MachineState) {}
}

/// Cooperative cancellation handle for [`Machine::run_async`]. Cheap to
/// clone; any holder can trip it from any thread (`spec.md` §5 command
/// posts).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Composition root: owns the CPU handle, bus, scheduler, signal bus,
/// device registry, and trap registry, and drives the run loop
/// (`spec.md` §4.8).
pub struct Machine {
    cpu: Box<dyn ICpu>,
    bus: PagedBus,
    scheduler: Scheduler,
    signals: SignalBus,
    devices: DeviceRegistry,
    traps: TrapRegistry,
    state: MachineState,
    halt_reason: Option<HaltReason>,
    pause_requested: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    watchdog_cycles: u64,
    observers: Vec<Box<dyn MachineObserver>>,
}

impl Machine {
    #[must_use]
    pub fn new(
        cpu: Box<dyn ICpu>,
        bus: PagedBus,
        scheduler: Scheduler,
        signals: SignalBus,
        devices: DeviceRegistry,
        traps: TrapRegistry,
    ) -> Self {
        Self {
            cpu,
            bus,
            scheduler,
            signals,
            devices,
            traps,
            state: MachineState::Stopped,
            halt_reason: None,
            pause_requested: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            watchdog_cycles: DEFAULT_WATCHDOG_CYCLES,
            observers: Vec::new(),
        }
    }

    pub fn set_watchdog_cycles(&mut self, cycles: u64) {
        self.watchdog_cycles = cycles;
    }

    pub fn subscribe(&mut self, observer: Box<dyn MachineObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn state(&self) -> MachineState {
        self.state
    }

    #[must_use]
    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt_reason.as_ref()
    }

    #[must_use]
    pub fn bus(&self) -> &PagedBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut PagedBus {
        &mut self.bus
    }

    #[must_use]
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn traps_mut(&mut self) -> &mut TrapRegistry {
        &mut self.traps
    }

    fn set_state(&mut self, new_state: MachineState) {
        if new_state == self.state {
            return;
        }
        let old = self.state;
        self.state = new_state;
        log::info!("machine state {old:?} -> {new_state:?}");
        for obs in &mut self.observers {
            obs.state_changed(old, new_state);
        }
    }

    /// Requests a pause; observed by the run loop at the next safe
    /// point (`spec.md` §4.8, §5). Safe to call from any thread.
    pub fn pause(&self) {
        self.pause_requested.store(true, Ordering::Relaxed);
    }

    /// Requests a stop; observed by the run loop at the next safe point.
    /// Safe to call from any thread.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    /// Forces the machine to `Stopped`, resets the CPU and signal bus.
    /// Does not reset the scheduler (`spec.md` §4.8 names only CPU and
    /// signal-bus reset).
    pub fn reset(&mut self) {
        self.stop_requested.store(false, Ordering::Relaxed);
        self.pause_requested.store(false, Ordering::Relaxed);
        self.halt_reason = None;
        self.cpu.reset(&mut self.bus);
        self.signals.reset();
        self.set_state(MachineState::Stopped);
    }

    /// Forces the machine to `Stopped` with `halt_reason = Stp`,
    /// mirroring a CPU-initiated halt instruction (`spec.md` §4.8).
    pub fn halt(&mut self) {
        self.halt_reason = Some(HaltReason::Stp);
        self.set_state(MachineState::Stopped);
    }

    fn event_context(&self) -> EventContext {
        EventContext { cycle: self.scheduler.now() }
    }

    /// Execute exactly one CPU instruction, advance the scheduler by the
    /// cycles it consumed, drain due events, then transition to Paused
    /// (`spec.md` §4.8 `step()`). Returns the halt reason if the CPU
    /// reported `Halted` or panicked.
    pub fn step(&mut self) -> Option<HaltReason> {
        let outcome = self.run_one_cpu_step();
        if let Some(reason) = &outcome {
            self.halt_reason = Some(reason.clone());
            self.set_state(MachineState::Stopped);
        } else {
            self.set_state(MachineState::Paused);
        }
        outcome
    }

    /// A single `cpu.step()` call, with its bus/scheduler bookkeeping,
    /// shielded from a target or handler panic (`spec.md` §7
    /// `HandlerPanic` / `TargetInternalError`: fatal to the run, not the
    /// process).
    fn run_one_cpu_step(&mut self) -> Option<HaltReason> {
        let cpu = &mut self.cpu;
        let bus = &mut self.bus;
        let signals = &mut self.signals;
        let traps = &mut self.traps;
        let ctx = EventContext { cycle: self.scheduler.now() };

        let result = panic::catch_unwind(AssertUnwindSafe(|| cpu.step(bus, signals, traps, &ctx)));

        let step = match result {
            Ok(step) => step,
            Err(payload) => {
                let message = panic_message(&payload);
                log::error!("cpu step panicked: {message}");
                return Some(HaltReason::HandlerPanic(message));
            }
        };

        match step.outcome {
            StepOutcome::Halted => {
                let reason = self.cpu.halt_reason().unwrap_or(HaltReason::Stp);
                Some(reason)
            }
            StepOutcome::Normal => {
                self.signals.signal_instruction_executed(step.cycles_consumed);
                let to_cycle = self.scheduler.now() + step.cycles_consumed;
                self.scheduler.advance(to_cycle);
                None
            }
            StepOutcome::WaitingForInterrupt => {
                let bound = self.scheduler.now() + self.watchdog_cycles;
                let target = self.scheduler.next_due().map_or(bound, |due| due.min(bound));
                self.scheduler.advance(target);
                None
            }
        }
    }

    /// Synchronous run loop: repeatedly steps the CPU while `Running`
    /// and neither `pause()` nor `stop()` has been observed
    /// (`spec.md` §4.8, §5).
    pub fn run(&mut self) -> Option<HaltReason> {
        self.run_inner(None)
    }

    /// Same as `run()`, but also exits when `cancel` is tripped
    /// (`spec.md` §5: "`run_async(cancel_token)` returns when the token
    /// is tripped"). This crate spawns no interior thread; the name
    /// describes a cancellable run loop rather than an async executor.
    pub fn run_async(&mut self, cancel: &CancelToken) -> Option<HaltReason> {
        self.run_inner(Some(cancel))
    }

    fn run_inner(&mut self, cancel: Option<&CancelToken>) -> Option<HaltReason> {
        self.set_state(MachineState::Running);
        loop {
            if self.stop_requested.swap(false, Ordering::Relaxed) {
                self.set_state(MachineState::Stopped);
                return self.halt_reason.clone();
            }
            if self.pause_requested.swap(false, Ordering::Relaxed) {
                self.set_state(MachineState::Paused);
                return None;
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                self.set_state(MachineState::Paused);
                return None;
            }

            if let Some(reason) = self.run_one_cpu_step() {
                self.halt_reason = Some(reason.clone());
                self.set_state(MachineState::Stopped);
                return Some(reason);
            }
        }
    }

    #[must_use]
    pub fn event_context_now(&self) -> EventContext {
        self.event_context()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
