//! Error taxonomy (`spec.md` §7).
//!
//! This crate's fault and configuration surface is too rich for a bare
//! `io::Error` wrapper; it uses a `thiserror`-derived taxonomy instead,
//! the same pattern other cycle-stepped 8-bit-bus emulator cores in the
//! Rust ecosystem reach for.

use thiserror::Error;

use crate::addr::Addr;
use crate::ids::{DeviceId, GroupId};
use crate::perms::{Intent, RegionTag};

/// Runtime faults a bus access can return. Never fatal to the bus —
/// the CPU's fault-response policy decides whether execution continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("permission fault at {address}: intent {intent:?} not in perms for region {region:?}")]
    PermissionFault {
        address: Addr,
        intent: Intent,
        region: RegionTag,
    },

    #[error("unmapped fault at {address}: intent {intent:?}")]
    UnmappedFault { address: Addr, intent: Intent },

    #[error("alignment fault at {address}: width {width_bits} bits requires alignment")]
    AlignmentFault { address: Addr, width_bits: u8 },
}

/// Build-time configuration errors. Fatal to machine construction;
/// surfaced to the profile loader / builder, never seen at run time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("composite layer '{0}' already registered")]
    DuplicateLayer(String),

    #[error("swap group '{0}' already registered")]
    DuplicateGroup(String),

    #[error("variant '{variant}' already registered in swap group {group}")]
    DuplicateVariant { group: GroupId, variant: String },

    #[error("invalid permissions {0:?} requested for a ROM target (write not permitted)")]
    InvalidPermissions(crate::perms::Permissions),

    #[error("page range [{first}, {first}+{count}) exceeds the bus's page count {page_count}")]
    ImpossiblePageRange {
        first: usize,
        count: usize,
        page_count: usize,
    },

    #[error("unknown composite layer: {0}")]
    UnknownLayer(String),

    #[error("unknown swap group: {0:?}")]
    UnknownGroup(GroupId),

    #[error("unknown swap variant '{variant}' in group {group:?}")]
    UnknownVariant { group: GroupId, variant: String },

    #[error("target out of range: phys_base {phys_base} + page size exceeds target size {target_size}")]
    TargetOutOfRange { phys_base: u32, target_size: usize },
}

/// Why a machine halted. `Stp` is the ordinary CPU-requested halt;
/// the other two variants are recorded by the run loop when it catches
/// a runtime failure that is fatal to the *run*, not to the process
/// (`HandlerPanic`, `TargetInternalError`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    #[error("CPU executed STP / halt instruction")]
    Stp,

    #[error("explicit halt() call")]
    Requested,

    #[error("scheduler or trap callback panicked: {0}")]
    HandlerPanic(String),

    #[error("target {device:?} performed an out-of-bounds physical access at offset {offset}")]
    TargetInternalError { device: DeviceId, offset: u32 },

    #[error("layer '{0}' resolve() panicked")]
    LayerPanic(String),
}

/// Outcome of a trap lookup/dispatch (`spec.md` §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapResult {
    Handled {
        cycles: u32,
        return_address: Option<Addr>,
    },
    NotHandled,
}

/// Non-throwing access result, matching `try_read`/`try_write` in
/// `spec.md` §4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome<T> {
    Ok(T),
    Failed(Fault),
}

impl<T> AccessOutcome<T> {
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            AccessOutcome::Ok(v) => Some(v),
            AccessOutcome::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, AccessOutcome::Ok(_))
    }
}
