//! Concrete composite layers (`spec.md` §4.2): the language card and the
//! 80STORE auxiliary-memory overlay. Both are illustrative examples in
//! `spec.md`'s own words, but both are also load-bearing parts of a
//! working Apple IIe memory map, so this crate ships real
//! implementations rather than leaving them as an exercise for a caller.

pub mod aux_memory;
pub mod language_card;

pub use aux_memory::{AuxMemoryLayer, AuxMemoryState};
pub use language_card::{LanguageCardLayer, LanguageCardState};
