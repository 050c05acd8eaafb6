//! The paged bus and its supporting registries (`spec.md` §4.1–§4.3).

pub mod layer;
pub mod page_table;
pub mod paged_bus;
pub mod swap;
pub mod trace;

pub use layer::{CompositeLayer, LayerRegistry, Resolution};
pub use page_table::PageTableEntry;
pub use paged_bus::PagedBus;
pub use swap::{SwapGroup, SwapGroupRegistry, Variant};
pub use trace::{TraceBuffer, TraceEvent};
