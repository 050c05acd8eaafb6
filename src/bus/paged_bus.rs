//! The paged memory bus (`spec.md` §4.1): fixed 4 KiB pages translating
//! every CPU-visible access into a target operation, permission-checked,
//! with composite-layer overrides and optional tracing.

use crate::access::{AccessFlags, BusAccess};
use crate::addr::Addr;
use crate::bus::layer::{CompositeLayer, LayerRegistry};
use crate::bus::page_table::PageTableEntry;
use crate::bus::swap::SwapGroupRegistry;
use crate::bus::trace::{TraceBuffer, TraceEvent};
use crate::error::{AccessOutcome, ConfigError, Fault};
use crate::ids::{GroupId, LayerId, TargetId};
use crate::memory::target::Target;
use crate::perms::{Intent, Permissions, RegionTag, TargetCaps};

#[derive(Debug, Clone, Copy)]
struct Resolved {
    target: TargetId,
    offset: u32,
    perms: Permissions,
    tag: RegionTag,
    caps: TargetCaps,
    device_id: crate::ids::DeviceId,
}

pub struct PagedBus {
    address_space_bits: u32,
    address_mask: u32,
    pages: Vec<PageTableEntry>,
    page_layer_candidates: Vec<Vec<LayerId>>,
    targets: Vec<Target>,
    layers: LayerRegistry,
    swap_groups: SwapGroupRegistry,
    trace: TraceBuffer,
}

impl PagedBus {
    /// `address_space_bits` must be in `12..=32` (`spec.md` §3).
    #[must_use]
    pub fn new(address_space_bits: u32) -> Self {
        assert!(
            (12..=32).contains(&address_space_bits),
            "address_space_bits must be 12..=32, got {address_space_bits}"
        );
        let page_count = 1usize << (address_space_bits - 12);
        let address_mask = if address_space_bits == 32 {
            u32::MAX
        } else {
            (1u32 << address_space_bits) - 1
        };
        Self {
            address_space_bits,
            address_mask,
            pages: vec![PageTableEntry::unmapped(); page_count],
            page_layer_candidates: vec![Vec::new(); page_count],
            targets: Vec::new(),
            layers: LayerRegistry::new(),
            swap_groups: SwapGroupRegistry::new(),
            trace: TraceBuffer::new(1024),
        }
    }

    #[must_use]
    pub fn address_space_bits(&self) -> u32 {
        self.address_space_bits
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn effective_address(&self, addr: Addr) -> Addr {
        Addr(addr.0 & self.address_mask)
    }

    // ── Target arena ───────────────────────────────────────────────

    pub fn add_target(&mut self, target: Target) -> TargetId {
        let id = TargetId(self.targets.len() as u32);
        self.targets.push(target);
        id
    }

    #[must_use]
    pub fn target(&self, id: TargetId) -> &Target {
        &self.targets[id.0 as usize]
    }

    pub fn target_mut(&mut self, id: TargetId) -> &mut Target {
        &mut self.targets[id.0 as usize]
    }

    // ── Page table ─────────────────────────────────────────────────

    pub fn map_page(&mut self, index: usize, entry: PageTableEntry) {
        self.pages[index] = entry;
    }

    pub fn map_page_range(
        &mut self,
        first: usize,
        count: usize,
        factory: impl Fn(usize) -> PageTableEntry,
    ) -> Result<(), ConfigError> {
        if first + count > self.pages.len() {
            return Err(ConfigError::ImpossiblePageRange { first, count, page_count: self.pages.len() });
        }
        for i in first..first + count {
            self.pages[i] = factory(i);
        }
        Ok(())
    }

    #[must_use]
    pub fn page_entry(&self, index: usize) -> PageTableEntry {
        self.pages[index]
    }

    // ── Composite layers ───────────────────────────────────────────

    pub fn register_composite_layer(&mut self, layer: Box<dyn CompositeLayer>) -> Result<LayerId, ConfigError> {
        let id = self.layers.register(layer)?;
        self.refresh_layer_candidates();
        Ok(id)
    }

    pub fn unregister_composite_layer(&mut self, name: &str) -> Result<(), ConfigError> {
        self.layers.unregister(name)?;
        self.refresh_layer_candidates();
        Ok(())
    }

    /// Recompute, for every page, the priority-ordered list of active
    /// layers overlapping it. Called whenever a layer is
    /// registered/unregistered; callers that flip a layer's own
    /// `is_active` state (e.g. a soft-switch handler) must call this
    /// again afterward so the cache reflects the new state — the single
    /// global recompute the Design Notes call "trivial on a
    /// single-threaded core" (`spec.md` §9).
    pub fn refresh_layer_candidates(&mut self) {
        for (idx, candidates) in self.page_layer_candidates.iter_mut().enumerate() {
            let page_addr = Addr((idx as u32) * Addr::PAGE_SIZE);
            *candidates = self.layers.candidates_for_page(page_addr);
        }
    }

    #[must_use]
    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    // ── Swap groups ────────────────────────────────────────────────

    pub fn create_swap_group(&mut self, name: impl Into<String>, virtual_base: Addr, size: u32) -> Result<GroupId, ConfigError> {
        self.swap_groups.create_group(name, virtual_base, size)
    }

    pub fn add_swap_variant(
        &mut self,
        group: GroupId,
        variant_name: impl Into<String>,
        target: TargetId,
        phys_base: u32,
        perms: Permissions,
    ) -> Result<(), ConfigError> {
        self.swap_groups.add_variant(group, variant_name, target, phys_base, perms)
    }

    /// Select a swap group's active variant, atomically rewriting the
    /// page-table entries for every page in the group's range. Per-page
    /// `device_id`/`region_tag`/`caps` are preserved; `target`,
    /// `phys_base`, and `perms` come from the variant (`spec.md` §4.3).
    pub fn select_swap_variant(&mut self, group: GroupId, variant_name: &str) -> Result<(), ConfigError> {
        let variant = self.swap_groups.select_variant(group, variant_name)?;
        let info = self.swap_groups.get(group).expect("group existed above");
        let first = info.first_page();
        let count = info.page_count();
        for i in 0..count {
            let entry = &mut self.pages[first + i];
            entry.target = Some(variant.target);
            entry.phys_base = variant.phys_base + (i as u32) * Addr::PAGE_SIZE;
            entry.perms = variant.perms;
        }
        Ok(())
    }

    #[must_use]
    pub fn get_active_swap_variant(&self, group: GroupId) -> Option<&crate::bus::swap::Variant> {
        self.swap_groups.get(group).and_then(|g| g.active_variant())
    }

    #[must_use]
    pub fn swap_groups(&self) -> &SwapGroupRegistry {
        &self.swap_groups
    }

    // ── Tracing ────────────────────────────────────────────────────

    pub fn set_tracing_enabled(&mut self, enabled: bool) {
        self.trace.set_enabled(enabled);
    }

    #[must_use]
    pub fn trace(&self) -> &TraceBuffer {
        &self.trace
    }

    // ── Resolution ─────────────────────────────────────────────────

    fn resolve(&self, addr: Addr, intent: Intent) -> Result<Resolved, Fault> {
        let addr = self.effective_address(addr);
        let idx = addr.page_index();
        let page = self.pages[idx];
        let candidates = &self.page_layer_candidates[idx];

        let (target, phys_base, perms, tag, caps) = match self.layers.resolve(candidates, addr, intent) {
            Some(res) => (res.target, res.phys_base, res.perms, res.tag, res.caps),
            None => {
                if !page.is_mapped() {
                    return Err(Fault::UnmappedFault { address: addr, intent });
                }
                (page.target.unwrap(), page.phys_base, page.perms, page.region_tag, page.caps)
            }
        };

        if let Some(required) = intent.required_permission() {
            if !perms.contains(required) {
                return Err(Fault::PermissionFault { address: addr, intent, region: tag });
            }
        }

        Ok(Resolved {
            target,
            offset: phys_base + addr.offset_in_page(),
            perms,
            tag,
            caps,
            device_id: page.device_id,
        })
    }

    fn trace_access(&mut self, addr: Addr, value: u32, width_bits: u8, access: &BusAccess, resolved: &Resolved) {
        if !self.trace.is_enabled() {
            return;
        }
        self.trace.record(TraceEvent {
            cycle: access.cycle,
            address: addr,
            value,
            width_bits,
            intent: access.intent,
            flags: access.flags,
            source_id: access.source_id,
            device_id: resolved.device_id,
            region_tag: resolved.tag,
        });
    }

    // ── 8-bit access ───────────────────────────────────────────────

    pub fn read8(&mut self, access: BusAccess) -> Result<u8, Fault> {
        let resolved = self.resolve(access.address, access.intent)?;
        let value = self.targets[resolved.target.0 as usize].read8(resolved.offset);
        self.trace_access(access.address, u32::from(value), 8, &access, &resolved);
        Ok(value)
    }

    pub fn write8(&mut self, access: BusAccess, value: u8) -> Result<(), Fault> {
        let resolved = self.resolve(access.address, access.intent)?;
        self.targets[resolved.target.0 as usize].write8(resolved.offset, value);
        self.trace_access(access.address, u32::from(value), 8, &access, &resolved);
        Ok(())
    }

    #[must_use]
    pub fn try_read8(&mut self, access: BusAccess) -> AccessOutcome<u8> {
        match self.read8(access) {
            Ok(v) => AccessOutcome::Ok(v),
            Err(e) => AccessOutcome::Failed(e),
        }
    }

    #[must_use]
    pub fn try_write8(&mut self, access: BusAccess, value: u8) -> AccessOutcome<()> {
        match self.write8(access, value) {
            Ok(()) => AccessOutcome::Ok(()),
            Err(e) => AccessOutcome::Failed(e),
        }
    }

    // ── 16-bit access ──────────────────────────────────────────────

    pub fn read16(&mut self, access: BusAccess) -> Result<u16, Fault> {
        let addr1 = self.effective_address(access.address);
        let addr2 = addr1.wrapping_add(1);
        if access.flags.contains(AccessFlags::ALIGN_CHECK) && addr1.0 % 2 != 0 {
            return Err(Fault::AlignmentFault { address: addr1, width_bits: 16 });
        }
        let r1 = self.resolve(addr1, access.intent)?;
        let r2 = self.resolve(addr2, access.intent)?;

        let value = if !access.flags.contains(AccessFlags::DECOMPOSE)
            && r1.target == r2.target
            && r1.caps.contains(TargetCaps::SUPPORTS_WIDE)
            && r2.offset == r1.offset + 1
        {
            self.targets[r1.target.0 as usize].read16(r1.offset)
        } else {
            let lo = self.targets[r1.target.0 as usize].read8(r1.offset);
            let hi = self.targets[r2.target.0 as usize].read8(r2.offset);
            u16::from_le_bytes([lo, hi])
        };
        self.trace_access(addr1, u32::from(value), 16, &access, &r1);
        Ok(value)
    }

    pub fn write16(&mut self, access: BusAccess, value: u16) -> Result<(), Fault> {
        let addr1 = self.effective_address(access.address);
        let addr2 = addr1.wrapping_add(1);
        if access.flags.contains(AccessFlags::ALIGN_CHECK) && addr1.0 % 2 != 0 {
            return Err(Fault::AlignmentFault { address: addr1, width_bits: 16 });
        }
        let r1 = self.resolve(addr1, access.intent)?;
        let r2 = self.resolve(addr2, access.intent)?;

        if !access.flags.contains(AccessFlags::DECOMPOSE)
            && r1.target == r2.target
            && r1.caps.contains(TargetCaps::SUPPORTS_WIDE)
            && r2.offset == r1.offset + 1
        {
            self.targets[r1.target.0 as usize].write16(r1.offset, value);
        } else {
            let [lo, hi] = value.to_le_bytes();
            self.targets[r1.target.0 as usize].write8(r1.offset, lo);
            self.targets[r2.target.0 as usize].write8(r2.offset, hi);
        }
        self.trace_access(addr1, u32::from(value), 16, &access, &r1);
        Ok(())
    }

    // ── 32-bit access (decomposed into two 16-bit halves) ───────────

    pub fn read32(&mut self, access: BusAccess) -> Result<u32, Fault> {
        let lo = self.read16(access)?;
        let hi_access = BusAccess { address: access.address.wrapping_add(2), ..access };
        let hi = self.read16(hi_access)?;
        Ok(u32::from(lo) | (u32::from(hi) << 16))
    }

    pub fn write32(&mut self, access: BusAccess, value: u32) -> Result<(), Fault> {
        self.write16(access, (value & 0xFFFF) as u16)?;
        let hi_access = BusAccess { address: access.address.wrapping_add(2), ..access };
        self.write16(hi_access, (value >> 16) as u16)
    }

    // ── Peek / poke (debugger access; side-effect suppressed) ───────

    #[must_use]
    pub fn peek8(&self, addr: Addr) -> Option<u8> {
        let resolved = self.resolve(addr, Intent::PeekRead).ok()?;
        self.targets[resolved.target.0 as usize].peek8(resolved.offset)
    }

    pub fn poke8(&mut self, addr: Addr, value: u8) -> bool {
        match self.resolve(addr, Intent::PokeWrite) {
            Ok(resolved) => self.targets[resolved.target.0 as usize].poke8(resolved.offset, value),
            Err(_) => false,
        }
    }
}
