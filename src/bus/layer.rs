//! Composite layers: per-access dynamic resolvers that override
//! page-table entries when active (`spec.md` §4.2).
//!
//! A fixed PLA mapping table only has one answer per address; the
//! *shape* this module generalizes — "given the current soft-switch
//! state, which physical bank does this address resolve to right now"
//! — is the same question an MMU's mapping-update routine answers, just
//! lifted into its own dynamically-registered, priority-ordered stage so
//! several independent overlays (language card, 80STORE aux memory, a
//! future slot-RAM card) can coexist without each one having to
//! special-case the others.

use std::fmt;

use crate::addr::Addr;
use crate::ids::{LayerId, TargetId};
use crate::perms::{Intent, Permissions, RegionTag, TargetCaps};

/// What a layer's `resolve` returns when it intercepts an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub target: TargetId,
    pub phys_base: u32,
    pub perms: Permissions,
    pub tag: RegionTag,
    pub caps: TargetCaps,
}

/// A context-sensitive mapping overlay. `resolve` must be pure and
/// deterministic given the layer's current internal state
/// (`spec.md` §4.2 invariant) — it must never mutate target data.
pub trait CompositeLayer: fmt::Debug {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn is_active(&self) -> bool;
    /// `(base, size)` in bytes; must be page-aligned and a page multiple.
    fn address_range(&self) -> (Addr, u32);
    fn resolve(&self, addr: Addr, intent: Intent) -> Option<Resolution>;
}

struct LayerSlot {
    id: LayerId,
    layer: Box<dyn CompositeLayer>,
    registration_order: u32,
}

/// Owns every registered composite layer and the per-page candidate
/// cache the bus consults on each access.
#[derive(Default)]
pub struct LayerRegistry {
    slots: Vec<LayerSlot>,
    next_id: u32,
    next_registration_order: u32,
}

impl LayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, layer: Box<dyn CompositeLayer>) -> Result<LayerId, crate::error::ConfigError> {
        if self.slots.iter().any(|s| s.layer.name() == layer.name()) {
            return Err(crate::error::ConfigError::DuplicateLayer(layer.name().to_string()));
        }
        let id = LayerId(self.next_id);
        self.next_id += 1;
        let registration_order = self.next_registration_order;
        self.next_registration_order += 1;
        log::info!("composite layer '{}' registered as {id}", layer.name());
        self.slots.push(LayerSlot { id, layer, registration_order });
        Ok(id)
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), crate::error::ConfigError> {
        let before = self.slots.len();
        self.slots.retain(|s| s.layer.name() != name);
        if self.slots.len() == before {
            return Err(crate::error::ConfigError::UnknownLayer(name.to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: LayerId) -> Option<&dyn CompositeLayer> {
        self.slots.iter().find(|s| s.id == id).map(|s| s.layer.as_ref())
    }

    /// Candidate layers overlapping `page_addr` (the page's base
    /// address), in priority order (ties broken by registration order,
    /// earlier wins — `spec.md` §4.2). Inactive layers are excluded.
    pub fn candidates_for_page(&self, page_addr: Addr) -> Vec<LayerId> {
        let mut candidates: Vec<&LayerSlot> = self
            .slots
            .iter()
            .filter(|s| s.layer.is_active())
            .filter(|s| {
                let (base, size) = s.layer.address_range();
                page_addr.0 >= base.0 && page_addr.0 < base.0 + size
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.layer
                .priority()
                .cmp(&a.layer.priority())
                .then(a.registration_order.cmp(&b.registration_order))
        });
        candidates.into_iter().map(|s| s.id).collect()
    }

    /// Resolve through the ordered candidate list, stopping at the first
    /// layer that returns `Some`.
    pub fn resolve(&self, candidates: &[LayerId], addr: Addr, intent: Intent) -> Option<Resolution> {
        for id in candidates {
            if let Some(layer) = self.get(*id) {
                if let Some(res) = layer.resolve(addr, intent) {
                    return Some(res);
                }
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &dyn CompositeLayer)> {
        self.slots.iter().map(|s| (s.id, s.layer.as_ref()))
    }
}

impl fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("count", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedLayer {
        name: &'static str,
        priority: i32,
        active: bool,
    }

    impl CompositeLayer for FixedLayer {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn is_active(&self) -> bool {
            self.active
        }
        fn address_range(&self) -> (Addr, u32) {
            (Addr::new(0xD000), 0x1000)
        }
        fn resolve(&self, _addr: Addr, _intent: Intent) -> Option<Resolution> {
            None
        }
    }

    #[test]
    fn higher_priority_wins_ties_break_by_registration_order() {
        let mut reg = LayerRegistry::new();
        reg.register(Box::new(FixedLayer { name: "low", priority: 1, active: true })).unwrap();
        reg.register(Box::new(FixedLayer { name: "high-a", priority: 5, active: true })).unwrap();
        reg.register(Box::new(FixedLayer { name: "high-b", priority: 5, active: true })).unwrap();

        let candidates = reg.candidates_for_page(Addr::new(0xD000));
        let names: Vec<&str> = candidates.iter().map(|id| reg.get(*id).unwrap().name()).collect();
        assert_eq!(names, vec!["high-a", "high-b", "low"]);
    }

    #[test]
    fn inactive_layers_are_excluded() {
        let mut reg = LayerRegistry::new();
        reg.register(Box::new(FixedLayer { name: "off", priority: 9, active: false })).unwrap();
        assert!(reg.candidates_for_page(Addr::new(0xD000)).is_empty());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = LayerRegistry::new();
        reg.register(Box::new(FixedLayer { name: "dup", priority: 0, active: true })).unwrap();
        let err = reg.register(Box::new(FixedLayer { name: "dup", priority: 0, active: true }));
        assert!(err.is_err());
    }
}
