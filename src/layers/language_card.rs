//! The language-card composite layer (`spec.md` §4.2).
//!
//! Built the same way every composite layer in this crate is: a mapping
//! computation answering "which physical bank does this address resolve
//! to right now" from soft-switch state. The state is kept in an atomic
//! bitfield rather than plain struct fields because `resolve` takes
//! `&self` only (`spec.md` §4.2 purity invariant) and the soft-switch
//! write handlers that flip it live behind `io_page.rs`'s `Send`
//! closures.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::addr::Addr;
use crate::bus::layer::{CompositeLayer, Resolution};
use crate::ids::TargetId;
use crate::perms::{Intent, Permissions, RegionTag, TargetCaps};

const RAM_READ: u8 = 1 << 0;
const RAM_WRITE: u8 = 1 << 1;
const BANK_2: u8 = 1 << 2;

/// Shared, cheaply-clonable handle to the language card's soft-switch
/// state. One clone lives in the [`LanguageCardLayer`]; another lives
/// wherever the `$C080`-`$C08F` soft switches are wired up.
#[derive(Debug, Clone)]
pub struct LanguageCardState(Arc<AtomicU8>);

impl Default for LanguageCardState {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageCardState {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    fn set_bit(&self, bit: u8, value: bool) {
        if value {
            self.0.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.0.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    pub fn set_ram_read_enabled(&self, enabled: bool) {
        self.set_bit(RAM_READ, enabled);
    }

    pub fn set_ram_write_enabled(&self, enabled: bool) {
        self.set_bit(RAM_WRITE, enabled);
    }

    pub fn select_bank2(&self, bank2: bool) {
        self.set_bit(BANK_2, bank2);
    }

    #[must_use]
    pub fn ram_read_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed) & RAM_READ != 0
    }

    #[must_use]
    pub fn ram_write_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed) & RAM_WRITE != 0
    }

    #[must_use]
    pub fn bank2_selected(&self) -> bool {
        self.0.load(Ordering::Relaxed) & BANK_2 != 0
    }
}

/// Resolves `$D000-$DFFF` to one of two 4 KiB banks and `$E000-$FFFF` to
/// a shared 8 KiB upper bank, per the bank-select and RAM-read/write
/// soft switches (`spec.md` §4.2).
#[derive(Debug)]
pub struct LanguageCardLayer {
    state: LanguageCardState,
    bank1: TargetId,
    bank2: TargetId,
    upper: TargetId,
}

impl LanguageCardLayer {
    #[must_use]
    pub fn new(state: LanguageCardState, bank1: TargetId, bank2: TargetId, upper: TargetId) -> Self {
        Self { state, bank1, bank2, upper }
    }
}

impl CompositeLayer for LanguageCardLayer {
    fn name(&self) -> &str {
        "language-card"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_active(&self) -> bool {
        self.state.ram_read_enabled() || self.state.ram_write_enabled()
    }

    fn address_range(&self) -> (Addr, u32) {
        (Addr::new(0xD000), 0x3000)
    }

    fn resolve(&self, addr: Addr, intent: Intent) -> Option<Resolution> {
        let mut perms = Permissions::NONE;
        if self.state.ram_read_enabled() {
            perms |= Permissions::READ | Permissions::EXECUTE;
        }
        if self.state.ram_write_enabled() {
            perms |= Permissions::WRITE;
        }

        let (target, phys_base) = if addr.0 < 0xE000 {
            let bank = if self.state.bank2_selected() { self.bank2 } else { self.bank1 };
            (bank, addr.0 - 0xD000)
        } else {
            (self.upper, addr.0 - 0xE000)
        };

        Some(Resolution {
            target,
            phys_base,
            perms,
            tag: RegionTag::Ram,
            caps: TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::SUPPORTS_WIDE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::BusAccess;
    use crate::bus::page_table::PageTableEntry;
    use crate::bus::PagedBus;
    use crate::ids::DeviceId;
    use crate::memory::target::{RamTarget, RomTarget, Target};

    const DEV: DeviceId = DeviceId(0);

    fn entry(target: TargetId, phys_base: u32, perms: Permissions, tag: RegionTag, caps: TargetCaps) -> PageTableEntry {
        PageTableEntry { device_id: DEV, region_tag: tag, perms, caps, target: Some(target), phys_base }
    }

    /// Scenario S1 — language-card bank switch (`spec.md` §8).
    #[test]
    fn scenario_s1_language_card_bank_switch() {
        let mut bus = PagedBus::new(16);

        let ram = bus.add_target(Target::Ram(RamTarget::new("main-ram", 0xC000, 0)));
        let mut rom_img = RomTarget::new("system-rom", 0x3000);
        rom_img.load_image(0, &[0xEA; 0x3000]);
        let rom = bus.add_target(Target::Rom(rom_img));
        let bank1 = bus.add_target(Target::Ram(RamTarget::new("lc-bank1", 0x1000, 0x11)));
        let bank2 = bus.add_target(Target::Ram(RamTarget::new("lc-bank2", 0x1000, 0x22)));
        let upper = bus.add_target(Target::Ram(RamTarget::new("lc-upper", 0x2000, 0x33)));

        bus.map_page_range(0, 0xC000 / 0x1000, |i| {
            entry(ram, (i as u32) * 0x1000, Permissions::RWX, RegionTag::Ram, TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE)
        })
        .unwrap();
        bus.map_page_range(0xD, 0x3, |i| {
            entry(rom, ((i - 0xD) as u32) * 0x1000, Permissions::RX, RegionTag::Rom, TargetCaps::SUPPORTS_PEEK)
        })
        .unwrap();

        let state = LanguageCardState::new();
        bus.register_composite_layer(Box::new(LanguageCardLayer::new(state.clone(), bank1, bank2, upper))).unwrap();

        assert_eq!(bus.read8(BusAccess::data_read(Addr::new(0xD000), 0, crate::addr::Cycle(0))).unwrap(), 0xEA);

        state.set_ram_read_enabled(true);
        bus.refresh_layer_candidates();
        assert_eq!(bus.read8(BusAccess::data_read(Addr::new(0xD000), 0, crate::addr::Cycle(0))).unwrap(), 0x11);

        state.select_bank2(true);
        assert_eq!(bus.read8(BusAccess::data_read(Addr::new(0xD000), 0, crate::addr::Cycle(0))).unwrap(), 0x22);
        assert_eq!(bus.read8(BusAccess::data_read(Addr::new(0xE000), 0, crate::addr::Cycle(0))).unwrap(), 0x33);

        state.set_ram_read_enabled(false);
        bus.refresh_layer_candidates();
        assert_eq!(bus.read8(BusAccess::data_read(Addr::new(0xD000), 0, crate::addr::Cycle(0))).unwrap(), 0xEA);
    }
}
