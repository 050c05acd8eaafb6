//! Device registry (`spec.md` §3, §4 C10).
//!
//! Every device wired into a machine gets a stable integer + class-tagged
//! identifier, used by bus-trace events and page ownership. Generalizes
//! a fixed one-field-per-chip composition root into an open registry so
//! an arbitrary motherboard (keyboard, video, speaker, language card,
//! slot cards 1–7, ...) can be described without hardcoding chip names.

use std::collections::HashMap;

use crate::ids::DeviceId;

/// Coarse device classification, mirrored from the profile's recognized
/// `devices.motherboard[].type` values (`spec.md` §6) plus `Slot` for
/// peripheral cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Keyboard,
    Video,
    Character,
    Speaker,
    LanguageCard,
    Extended80Column,
    Slot,
    Cpu,
    Other,
}

/// `(class, subclass, index)` — e.g. `(Slot, "disk2", 6)` for a Disk II
/// controller in slot 6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    pub class: DeviceClass,
    pub subclass: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub page_id: PageId,
    pub kind: String,
    pub name: String,
    /// Slash-delimited location in the motherboard tree, e.g.
    /// "motherboard/slots/6/disk2".
    pub wiring_path: String,
}

/// Stable registry of every device known to a machine. Registration is
/// append-only; ids are assigned sequentially starting at 0.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceInfo>,
    by_wiring_path: HashMap<String, DeviceId>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        page_id: PageId,
        kind: impl Into<String>,
        name: impl Into<String>,
        wiring_path: impl Into<String>,
    ) -> DeviceId {
        let id = DeviceId(self.devices.len() as i32);
        let wiring_path = wiring_path.into();
        self.devices.push(DeviceInfo {
            id,
            page_id,
            kind: kind.into(),
            name: name.into(),
            wiring_path: wiring_path.clone(),
        });
        self.by_wiring_path.insert(wiring_path, id);
        log::debug!("device registered: {:?}", self.devices.last().unwrap());
        id
    }

    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&DeviceInfo> {
        self.devices.get(id.0 as usize)
    }

    #[must_use]
    pub fn find_by_wiring_path(&self, path: &str) -> Option<DeviceId> {
        self.by_wiring_path.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_assigns_sequential_ids() {
        let mut reg = DeviceRegistry::new();
        let a = reg.register(
            PageId { class: DeviceClass::Keyboard, subclass: "kbd".into(), index: 0 },
            "keyboard",
            "Keyboard",
            "motherboard/keyboard",
        );
        let b = reg.register(
            PageId { class: DeviceClass::Slot, subclass: "disk2".into(), index: 6 },
            "disk2",
            "Disk II",
            "motherboard/slots/6",
        );
        assert_eq!(a, DeviceId(0));
        assert_eq!(b, DeviceId(1));
        assert_eq!(reg.find_by_wiring_path("motherboard/slots/6"), Some(b));
    }
}
