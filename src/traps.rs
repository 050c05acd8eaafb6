//! The trap registry: divert execution at known ROM entry points into
//! native host code (`spec.md` §4.7).
//!
//! Generalizes the "skip simulating this known routine" idea — a
//! hardcoded JMP patch diverting a known ROM vector (e.g. a BASIC
//! warm-start entry point) to host code — into a keyed, enable/disable-able
//! table gated by which physical mapping is currently visible at the
//! trap's address.

use std::collections::HashMap;
use std::fmt;

use crate::addr::{Addr, Cycle};
use crate::bus::PagedBus;
use crate::error::TrapResult;
use crate::ids::TrapId;

/// What kind of CPU activity at the address should divert to the
/// handler (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapOperation {
    Call,
    Read,
    Write,
}

/// Which physical mapping must be visible at `address` for a trap to be
/// eligible (`spec.md` §3, §4.7). `Custom` covers collaborator-defined
/// tags (e.g. a third-party RAM card's own bank state).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryContext {
    Rom,
    LanguageCardRam,
    AuxiliaryRam,
    Custom(String),
}

/// Supplies the registry with the machine's current banking state so
/// lookups can be context-sensitive without per-trap invalidation
/// (`spec.md` §9: "the registry consults current context state on each
/// lookup").
pub trait TrapContextOracle {
    fn current_memory_context(&self, address: Addr) -> MemoryContext;
    fn slot_installed(&self, slot: u8) -> bool;
    fn active_expansion_slot(&self) -> Option<u8>;
}

/// Minimal fixed context oracle for machines with no slot cards and a
/// single addressable memory context (tests, or a bare system without
/// a language card). Always reports `Rom`.
#[derive(Debug, Default)]
pub struct StaticRomOracle;

impl TrapContextOracle for StaticRomOracle {
    fn current_memory_context(&self, _address: Addr) -> MemoryContext {
        MemoryContext::Rom
    }
    fn slot_installed(&self, _slot: u8) -> bool {
        false
    }
    fn active_expansion_slot(&self) -> Option<u8> {
        None
    }
}

/// Carried into every trap handler invocation; the scheduler's cycle at
/// the moment the trap fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    pub cycle: Cycle,
}

pub type TrapCallback = Box<dyn FnMut(&mut PagedBus, &EventContext) -> TrapResult + Send>;

pub struct TrapEntry {
    pub id: TrapId,
    pub address: Addr,
    pub operation: TrapOperation,
    pub memory_context: MemoryContext,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub slot_constraint: Option<u8>,
    pub enabled: bool,
    callback: TrapCallback,
}

impl fmt::Debug for TrapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapEntry")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("operation", &self.operation)
            .field("memory_context", &self.memory_context)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum TrapEvent {
    Registered(TrapId),
    Unregistered(TrapId),
    EnabledChanged { id: TrapId, enabled: bool },
    Invoked { id: TrapId, result: TrapResult },
}

pub trait TrapRegistryObserver {
    fn on_event(&mut self, _event: &TrapEvent) {}
}

type LookupKey = (Addr, TrapOperation, MemoryContext);

/// Owns every registered trap and dispatches `try_execute` against the
/// oracle-supplied current memory context (`spec.md` §4.7).
pub struct TrapRegistry {
    oracle: Box<dyn TrapContextOracle>,
    entries: Vec<TrapEntry>,
    index: HashMap<LookupKey, usize>,
    category_enabled: HashMap<String, bool>,
    observers: Vec<Box<dyn TrapRegistryObserver>>,
    next_id: u64,
}

impl fmt::Debug for TrapRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapRegistry").field("entries", &self.entries.len()).finish()
    }
}

impl TrapRegistry {
    #[must_use]
    pub fn new(oracle: Box<dyn TrapContextOracle>) -> Self {
        Self {
            oracle,
            entries: Vec::new(),
            index: HashMap::new(),
            category_enabled: HashMap::new(),
            observers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn TrapRegistryObserver>) {
        self.observers.push(observer);
    }

    fn emit(&mut self, event: TrapEvent) {
        for obs in &mut self.observers {
            obs.on_event(&event);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn insert(
        &mut self,
        address: Addr,
        operation: TrapOperation,
        memory_context: MemoryContext,
        name: impl Into<String>,
        category: impl Into<String>,
        description: Option<String>,
        slot_constraint: Option<u8>,
        callback: TrapCallback,
    ) -> TrapId {
        let id = TrapId(self.next_id);
        self.next_id += 1;
        let key = (address, operation, memory_context.clone());
        let idx = self.entries.len();
        self.entries.push(TrapEntry {
            id,
            address,
            operation,
            memory_context,
            name: name.into(),
            category: category.into(),
            description,
            slot_constraint,
            enabled: true,
            callback,
        });
        self.index.insert(key, idx);
        log::info!("trap '{}' registered at {address} ({operation:?})", self.entries[idx].name);
        self.emit(TrapEvent::Registered(id));
        id
    }

    /// Register a `Call` trap in the `Rom` context (`spec.md` §4.7
    /// default operation/context).
    pub fn register(
        &mut self,
        address: Addr,
        name: impl Into<String>,
        category: impl Into<String>,
        handler: TrapCallback,
        description: Option<String>,
    ) -> TrapId {
        self.insert(address, TrapOperation::Call, MemoryContext::Rom, name, category, description, None, handler)
    }

    /// Fires only while `slot` has a card installed, and — if `address`
    /// falls in the expansion-ROM window — only while `slot` is also
    /// the currently active expansion slot (`spec.md` §4.7).
    pub fn register_slot_dependent(
        &mut self,
        address: Addr,
        slot: u8,
        name: impl Into<String>,
        category: impl Into<String>,
        handler: TrapCallback,
    ) -> TrapId {
        self.insert(address, TrapOperation::Call, MemoryContext::Rom, name, category, None, Some(slot), handler)
    }

    /// Fires only while language-card RAM read is currently enabled at
    /// `address` (`spec.md` §4.7).
    pub fn register_language_card_ram(
        &mut self,
        address: Addr,
        name: impl Into<String>,
        category: impl Into<String>,
        handler: TrapCallback,
    ) -> TrapId {
        self.insert(
            address,
            TrapOperation::Call,
            MemoryContext::LanguageCardRam,
            name,
            category,
            None,
            None,
            handler,
        )
    }

    pub fn register_with_context(
        &mut self,
        address: Addr,
        context: MemoryContext,
        operation: TrapOperation,
        name: impl Into<String>,
        category: impl Into<String>,
        handler: TrapCallback,
        description: Option<String>,
    ) -> TrapId {
        self.insert(address, operation, context, name, category, description, None, handler)
    }

    pub fn unregister(&mut self, address: Addr, op: Option<TrapOperation>, context: Option<MemoryContext>) {
        let op = op.unwrap_or(TrapOperation::Call);
        let context = context.unwrap_or(MemoryContext::Rom);
        if let Some(idx) = self.index.remove(&(address, op, context)) {
            let id = self.entries[idx].id;
            self.entries.remove(idx);
            self.reindex_after_removal(idx);
            self.emit(TrapEvent::Unregistered(id));
        }
    }

    pub fn unregister_slot_traps(&mut self, slot: u8) {
        let ids: Vec<TrapId> = self
            .entries
            .iter()
            .filter(|e| e.slot_constraint == Some(slot))
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.unregister_by_id(id);
        }
    }

    pub fn unregister_context_traps(&mut self, context: &MemoryContext) {
        let ids: Vec<TrapId> = self
            .entries
            .iter()
            .filter(|e| &e.memory_context == context)
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.unregister_by_id(id);
        }
    }

    fn unregister_by_id(&mut self, id: TrapId) {
        if let Some(idx) = self.entries.iter().position(|e| e.id == id) {
            let entry = self.entries.remove(idx);
            self.index.remove(&(entry.address, entry.operation, entry.memory_context));
            self.reindex_after_removal(idx);
            self.emit(TrapEvent::Unregistered(id));
        }
    }

    /// `Vec::remove` shifts every later element down by one; the index
    /// map's stored positions for those entries must shift with them.
    fn reindex_after_removal(&mut self, removed_idx: usize) {
        for v in self.index.values_mut() {
            if *v > removed_idx {
                *v -= 1;
            }
        }
    }

    pub fn clear(&mut self) {
        let ids: Vec<TrapId> = self.entries.iter().map(|e| e.id).collect();
        self.entries.clear();
        self.index.clear();
        for id in ids {
            self.emit(TrapEvent::Unregistered(id));
        }
    }

    pub fn set_category_enabled(&mut self, category: impl Into<String>, enabled: bool) {
        self.category_enabled.insert(category.into(), enabled);
    }

    pub fn set_enabled(&mut self, address: Addr, op: Option<TrapOperation>, enabled: bool, context: Option<MemoryContext>) {
        let op = op.unwrap_or(TrapOperation::Call);
        let context = context.unwrap_or(MemoryContext::Rom);
        if let Some(&idx) = self.index.get(&(address, op, context)) {
            self.entries[idx].enabled = enabled;
            let id = self.entries[idx].id;
            self.emit(TrapEvent::EnabledChanged { id, enabled });
        }
    }

    fn entry_is_eligible(&self, idx: usize, address: Addr) -> bool {
        let entry = &self.entries[idx];
        if !entry.enabled {
            return false;
        }
        if !*self.category_enabled.get(&entry.category).unwrap_or(&true) {
            return false;
        }
        if let Some(slot) = entry.slot_constraint {
            if !self.oracle.slot_installed(slot) {
                return false;
            }
            let in_expansion_rom = (0xC800..=0xCFFF).contains(&address.0);
            if in_expansion_rom && self.oracle.active_expansion_slot() != Some(slot) {
                return false;
            }
        }
        true
    }

    fn try_key(
        &mut self,
        address: Addr,
        operation: TrapOperation,
        context: MemoryContext,
        bus: &mut PagedBus,
        ctx: &EventContext,
    ) -> Option<TrapResult> {
        let idx = *self.index.get(&(address, operation, context))?;
        if !self.entry_is_eligible(idx, address) {
            return None;
        }
        let result = (self.entries[idx].callback)(bus, ctx);
        let id = self.entries[idx].id;
        self.emit(TrapEvent::Invoked { id, result: result.clone() });
        Some(result)
    }

    /// Lookup order (`spec.md` §4.7): the entry matching the current
    /// memory context if present and enabled; otherwise the entry in
    /// `Rom` context; otherwise `NotHandled`.
    pub fn try_execute(
        &mut self,
        address: Addr,
        operation: TrapOperation,
        bus: &mut PagedBus,
        ctx: &EventContext,
    ) -> TrapResult {
        let context = self.oracle.current_memory_context(address);
        if let Some(result) = self.try_key(address, operation, context.clone(), bus, ctx) {
            return result;
        }
        if context != MemoryContext::Rom {
            if let Some(result) = self.try_key(address, operation, MemoryContext::Rom, bus, ctx) {
                return result;
            }
        }
        TrapResult::NotHandled
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct SwitchableOracle {
        context: Rc<Cell<MemoryContext>>,
    }
    impl TrapContextOracle for SwitchableOracle {
        fn current_memory_context(&self, _address: Addr) -> MemoryContext {
            let v = self.context.take();
            self.context.set(v.clone());
            v
        }
        fn slot_installed(&self, _slot: u8) -> bool {
            true
        }
        fn active_expansion_slot(&self) -> Option<u8> {
            Some(3)
        }
    }

    fn handler(_tag: &'static str) -> TrapCallback {
        Box::new(move |_bus, _ctx| TrapResult::Handled { cycles: 0, return_address: None })
    }

    #[test]
    fn unregistered_address_is_not_handled() {
        let mut reg = TrapRegistry::new(Box::new(StaticRomOracle));
        let mut bus = PagedBus::new(16);
        let result = reg.try_execute(Addr::new(0xFC58), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert_eq!(result, TrapResult::NotHandled);
    }

    #[test]
    fn registered_call_trap_fires() {
        let mut reg = TrapRegistry::new(Box::new(StaticRomOracle));
        let mut bus = PagedBus::new(16);
        reg.register(Addr::new(0xFC58), "HOME", "monitor", handler("home"), None);
        let result = reg.try_execute(Addr::new(0xFC58), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert!(matches!(result, TrapResult::Handled { .. }));
    }

    #[test]
    fn disabled_category_suppresses_dispatch() {
        let mut reg = TrapRegistry::new(Box::new(StaticRomOracle));
        let mut bus = PagedBus::new(16);
        reg.register(Addr::new(0xFC58), "HOME", "monitor", handler("home"), None);
        reg.set_category_enabled("monitor", false);
        let result = reg.try_execute(Addr::new(0xFC58), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert_eq!(result, TrapResult::NotHandled);
    }

    /// Scenario S7 — trap context-sensitivity (`spec.md` §8).
    #[test]
    fn scenario_s7_context_sensitivity() {
        let context = Rc::new(Cell::new(MemoryContext::Rom));
        let mut reg = TrapRegistry::new(Box::new(SwitchableOracle { context: context.clone() }));
        let mut bus = PagedBus::new(16);
        let fired = Rc::new(Cell::new(""));
        let fired_rom = fired.clone();
        let fired_lc = fired.clone();

        reg.register(
            Addr::new(0xD000),
            "h1",
            "rom",
            Box::new(move |_b, _c| {
                fired_rom.set("H1");
                TrapResult::Handled { cycles: 1, return_address: None }
            }),
            None,
        );
        reg.register_language_card_ram(
            Addr::new(0xD000),
            "h2",
            "lc",
            Box::new(move |_b, _c| {
                fired_lc.set("H2");
                TrapResult::Handled { cycles: 1, return_address: None }
            }),
        );

        reg.try_execute(Addr::new(0xD000), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert_eq!(fired.get(), "H1");

        context.set(MemoryContext::LanguageCardRam);
        reg.try_execute(Addr::new(0xD000), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert_eq!(fired.get(), "H2");
    }

    #[test]
    fn slot_dependent_trap_requires_card_and_active_expansion_slot() {
        let mut reg = TrapRegistry::new(Box::new(StaticRomOracle)); // slot_installed == false always
        let mut bus = PagedBus::new(16);
        reg.register_slot_dependent(Addr::new(0xC800), 6, "disk2-boot", "slot", handler("d2"));
        let result = reg.try_execute(Addr::new(0xC800), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert_eq!(result, TrapResult::NotHandled); // StaticRomOracle reports no card installed
    }

    #[test]
    fn unregister_removes_entry_and_reindexes_siblings() {
        let mut reg = TrapRegistry::new(Box::new(StaticRomOracle));
        let mut bus = PagedBus::new(16);
        reg.register(Addr::new(0x1000), "a", "cat", handler("a"), None);
        reg.register(Addr::new(0x2000), "b", "cat", handler("b"), None);
        reg.unregister(Addr::new(0x1000), None, None);
        let result = reg.try_execute(Addr::new(0x2000), TrapOperation::Call, &mut bus, &EventContext { cycle: Cycle(0) });
        assert!(matches!(result, TrapResult::Handled { .. }));
        assert_eq!(reg.len(), 1);
    }
}
