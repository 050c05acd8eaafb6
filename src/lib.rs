//! Apple IIe-compatible emulation substrate.
//!
//! This crate is the machine-independent core described in its own
//! design documents: a paged memory bus with composite-layer overlays
//! and swap-group banking, a discrete-event scheduler, a refcounted
//! signal bus, a context-sensitive trap registry, and the machine
//! lifecycle that drives a pluggable [`cpu::ICpu`] over all of it. It
//! does not decode 6502/65C02/65816 instructions, parse ROM images, or
//! render video — those are external collaborators this crate exposes
//! seams for, not implementations it ships.

pub mod access;
pub mod addr;
pub mod bus;
pub mod cpu;
pub mod device;
pub mod error;
pub mod ids;
pub mod io_page;
pub mod layers;
pub mod machine;
pub mod memory;
pub mod perms;
pub mod profile;
pub mod scheduler;
pub mod signals;
pub mod traps;

pub use access::{AccessFlags, BusAccess};
pub use addr::{Addr, Cycle};
pub use bus::PagedBus;
pub use cpu::{ICpu, StepOutcome, StepResult};
pub use device::{DeviceClass, DeviceInfo, DeviceRegistry, PageId};
pub use error::{AccessOutcome, ConfigError, Fault, HaltReason, TrapResult};
pub use ids::{DeviceId, EventHandle, GroupId, LayerId, TargetId, TrapId};
pub use machine::{CancelToken, Machine, MachineObserver, MachineState};
pub use memory::{BusTarget, RamTarget, RomTarget, Target};
pub use perms::{Intent, Permissions, RegionTag, TargetCaps};
pub use profile::MachineProfile;
pub use scheduler::{EventMeta, Scheduler, SchedulerObserver};
pub use signals::{SampleState, SignalBus, SignalLine};
pub use traps::{MemoryContext, TrapContextOracle, TrapOperation, TrapRegistry};
