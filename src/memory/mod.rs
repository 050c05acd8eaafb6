//! Physical memory storage and the bus target trait/variants.

pub mod block;
pub mod target;

pub use block::PhysicalMemory;
pub use target::{BusTarget, RamTarget, RomTarget, Target};
