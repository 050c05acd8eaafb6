//! The I/O page: a single composite `BusTarget` owning `$C000–$CFFF`
//! (`spec.md` §4.4).
//!
//! A whole-page-to-one-of-N-banks dispatch is the common shape for this
//! kind of chip-select logic; this target instead fans out *within* one
//! page by offset, to a soft-switch table, eight 256-byte slot-ROM
//! windows, and a shared 2 KiB expansion window, since the Apple II's
//! `$Cxxx` geography needs sub-page granularity that a flat bank index
//! can't express.

use crate::perms::TargetCaps;

pub const FLOATING_BUS_DEFAULT: u8 = 0xFF;

type ReadHandler = Box<dyn FnMut(u32) -> u8 + Send>;
type WriteHandler = Box<dyn FnMut(u32, u8) + Send>;

/// One entry in the soft-switch dispatch table (offsets `$000`–`$0FF`).
#[derive(Default)]
struct SoftSwitchSlot {
    read: Option<ReadHandler>,
    write: Option<WriteHandler>,
}

/// Dispatch table for the 256 soft-switch offsets.
pub struct SoftSwitches {
    slots: Vec<SoftSwitchSlot>,
}

impl SoftSwitches {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(256);
        slots.resize_with(256, SoftSwitchSlot::default);
        Self { slots }
    }

    pub fn set_read(&mut self, offset: u8, handler: impl FnMut(u32) -> u8 + Send + 'static) {
        self.slots[offset as usize].read = Some(Box::new(handler));
    }

    pub fn set_write(&mut self, offset: u8, handler: impl FnMut(u32, u8) + Send + 'static) {
        self.slots[offset as usize].write = Some(Box::new(handler));
    }

    fn read(&mut self, offset: u8) -> Option<u8> {
        self.slots[offset as usize].read.as_mut().map(|h| h(u32::from(offset)))
    }

    fn write(&mut self, offset: u8, value: u8) -> bool {
        match self.slots[offset as usize].write.as_mut() {
            Some(h) => {
                h(u32::from(offset), value);
                true
            }
            None => false,
        }
    }
}

impl Default for SoftSwitches {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SoftSwitches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftSwitches").field("slots", &self.slots.len()).finish()
    }
}

/// The currently selected expansion slot (`spec.md` §4.4 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionSelection {
    #[default]
    None,
    Selected(u8),
}

/// One installed peripheral card's ROM images.
#[derive(Debug, Default)]
struct SlotCard {
    /// 256-byte slot ROM window at `$Cn00–$CnFF`.
    slot_rom: Option<[u8; 256]>,
    /// 2 KiB expansion ROM window at `$C800–$CFFF`.
    expansion_rom: Option<[u8; 2048]>,
}

/// Owns every installed card's ROM windows and the current expansion
/// selection.
#[derive(Debug)]
pub struct SlotManager {
    cards: [SlotCard; 8], // index 0 unused; slots are 1..=7
    selection: ExpansionSelection,
}

impl Default for SlotManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cards: std::array::from_fn(|_| SlotCard::default()),
            selection: ExpansionSelection::None,
        }
    }

    pub fn install_slot_rom(&mut self, slot: u8, rom: [u8; 256]) {
        assert!((1..=7).contains(&slot), "slot must be 1..=7, got {slot}");
        self.cards[slot as usize].slot_rom = Some(rom);
    }

    pub fn install_expansion_rom(&mut self, slot: u8, rom: [u8; 2048]) {
        assert!((1..=7).contains(&slot), "slot must be 1..=7, got {slot}");
        self.cards[slot as usize].expansion_rom = Some(rom);
    }

    #[must_use]
    pub fn has_card(&self, slot: u8) -> bool {
        (1..=7).contains(&slot) && (self.cards[slot as usize].slot_rom.is_some() || self.cards[slot as usize].expansion_rom.is_some())
    }

    #[must_use]
    pub fn selection(&self) -> ExpansionSelection {
        self.selection
    }

    fn select(&mut self, slot: u8) {
        self.selection = ExpansionSelection::Selected(slot);
    }

    fn deselect(&mut self) {
        self.selection = ExpansionSelection::None;
    }
}

/// The composite I/O target mapping `$C000–$CFFF` (`spec.md` §4.4).
#[derive(Debug)]
pub struct IoPageTarget {
    soft_switches: SoftSwitches,
    slots: SlotManager,
    internal_rom: Option<Vec<u8>>,
    int_cxrom: bool,
    int_c3rom: bool,
    floating_bus: u8,
}

impl IoPageTarget {
    #[must_use]
    pub fn new() -> Self {
        Self {
            soft_switches: SoftSwitches::new(),
            slots: SlotManager::new(),
            internal_rom: None,
            int_cxrom: false,
            int_c3rom: false,
            floating_bus: FLOATING_BUS_DEFAULT,
        }
    }

    pub fn soft_switches_mut(&mut self) -> &mut SoftSwitches {
        &mut self.soft_switches
    }

    pub fn slots_mut(&mut self) -> &mut SlotManager {
        &mut self.slots
    }

    #[must_use]
    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }

    /// Internal ROM bytes substituted across `$C100–$C7FF` under
    /// INTCXROM/INTC3ROM, indexed by `offset - 0x100`.
    pub fn set_internal_rom(&mut self, rom: Vec<u8>) {
        self.internal_rom = Some(rom);
    }

    pub fn set_int_cxrom(&mut self, enabled: bool) {
        self.int_cxrom = enabled;
    }

    #[must_use]
    pub fn int_cxrom(&self) -> bool {
        self.int_cxrom
    }

    pub fn set_int_c3rom(&mut self, enabled: bool) {
        self.int_c3rom = enabled;
    }

    #[must_use]
    pub fn int_c3rom(&self) -> bool {
        self.int_c3rom
    }

    fn internal_rom_byte(&self, offset: u32) -> u8 {
        match &self.internal_rom {
            Some(rom) => {
                let idx = (offset - 0x100) as usize;
                rom.get(idx).copied().unwrap_or(self.floating_bus)
            }
            None => self.floating_bus,
        }
    }

    fn slot_rom_access(&mut self, offset: u32) -> u8 {
        let n = ((offset >> 8) & 0x7) as u8;
        let within_slot = (offset & 0xFF) as usize;

        // INTCXROM: entire $C100-$C7FF returns internal ROM, no selection side effect.
        if self.int_cxrom {
            return self.internal_rom_byte(offset);
        }

        // INTC3ROM: slot 3 reads return internal ROM but still select slot 3.
        let suppressed_by_c3 = n == 3 && self.int_c3rom;
        if n >= 1 {
            self.slots.select(n);
        }

        if suppressed_by_c3 {
            return self.internal_rom_byte(offset);
        }

        match self.slots.cards.get(n as usize).and_then(|c| c.slot_rom.as_ref()) {
            Some(rom) => rom[within_slot],
            None => self.floating_bus,
        }
    }

    fn expansion_rom_access(&mut self, offset: u32) -> u8 {
        if offset == 0xFFF {
            let value = match self.slots.selection {
                ExpansionSelection::Selected(n) => self
                    .slots
                    .cards
                    .get(n as usize)
                    .and_then(|c| c.expansion_rom.as_ref())
                    .map_or(self.floating_bus, |rom| rom[0x7FF]),
                ExpansionSelection::None => self.floating_bus,
            };
            self.slots.deselect();
            return value;
        }
        let within = (offset & 0x7FF) as usize;
        match self.slots.selection {
            ExpansionSelection::Selected(n) => self
                .slots
                .cards
                .get(n as usize)
                .and_then(|c| c.expansion_rom.as_ref())
                .map_or(self.floating_bus, |rom| rom[within]),
            ExpansionSelection::None => self.floating_bus,
        }
    }
}

impl Default for IoPageTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::memory::target::BusTarget for IoPageTarget {
    fn name(&self) -> &str {
        "io_page"
    }

    fn len(&self) -> usize {
        crate::addr::Addr::PAGE_SIZE as usize
    }

    fn caps(&self) -> TargetCaps {
        TargetCaps::HAS_SIDE_EFFECTS | TargetCaps::VOLATILE
    }

    fn read8(&mut self, offset: u32) -> u8 {
        match offset {
            0x000..=0x0FF => self.soft_switches.read(offset as u8).unwrap_or(self.floating_bus),
            0x100..=0x7FF => self.slot_rom_access(offset),
            0x800..=0xFFF => self.expansion_rom_access(offset),
            _ => self.floating_bus,
        }
    }

    fn write8(&mut self, offset: u32, value: u8) {
        match offset {
            0x000..=0x0FF => {
                self.soft_switches.write(offset as u8, value);
            }
            0x100..=0x7FF => {
                // Writes still perform the slot-selection side effect.
                let _ = self.slot_rom_access(offset);
            }
            0xFFF => {
                let _ = self.expansion_rom_access(offset);
            }
            0x800..=0xFFE => {
                // Writes into the expansion ROM window are not meaningful; no state change.
            }
            _ => {}
        }
    }

    // IoPageTarget is never in a page declared SUPPORTS_PEEK/SUPPORTS_POKE:
    // every offset has a side effect (soft switch dispatch, slot selection),
    // so there is no side-effect-free observation to offer a debugger.
}
