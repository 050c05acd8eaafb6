//! Swap groups: named collections of pre-registered variants that
//! atomically rewrite a contiguous page range (`spec.md` §4.3).
//!
//! A single-page bank switch rewrites one page's chip routing at a time;
//! a swap group generalizes that to "rewrite N contiguous pages as one
//! transaction", the shape a language-card bank switch needs (two 4 KiB
//! banks plus a shared 8 KiB upper bank must all flip together).

use std::collections::HashMap;

use crate::addr::Addr;
use crate::error::ConfigError;
use crate::ids::{GroupId, TargetId};
use crate::perms::Permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub target: TargetId,
    pub phys_base: u32,
    pub perms: Permissions,
}

#[derive(Debug)]
pub struct SwapGroup {
    pub name: String,
    pub virtual_base: Addr,
    /// Size in bytes; always a page multiple.
    pub size: u32,
    variants: HashMap<String, Variant>,
    active: Option<String>,
}

impl SwapGroup {
    #[must_use]
    pub fn page_count(&self) -> usize {
        (self.size / Addr::PAGE_SIZE) as usize
    }

    #[must_use]
    pub fn first_page(&self) -> usize {
        self.virtual_base.page_index()
    }

    #[must_use]
    pub fn active_variant_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    #[must_use]
    pub fn active_variant(&self) -> Option<&Variant> {
        self.active.as_ref().and_then(|name| self.variants.get(name))
    }

    #[must_use]
    pub fn get_variant(&self, name: &str) -> Option<&Variant> {
        self.variants.get(name)
    }
}

/// Owns every registered swap group. Group ids are sequential starting
/// at 0 in registration order (`spec.md` §4.3).
#[derive(Debug, Default)]
pub struct SwapGroupRegistry {
    groups: Vec<SwapGroup>,
    by_name: HashMap<String, GroupId>,
}

impl SwapGroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_group(
        &mut self,
        name: impl Into<String>,
        virtual_base: Addr,
        size: u32,
    ) -> Result<GroupId, ConfigError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ConfigError::DuplicateGroup(name));
        }
        let id = GroupId(self.groups.len() as u32);
        self.groups.push(SwapGroup {
            name: name.clone(),
            virtual_base,
            size,
            variants: HashMap::new(),
            active: None,
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn add_variant(
        &mut self,
        group: GroupId,
        variant_name: impl Into<String>,
        target: TargetId,
        phys_base: u32,
        perms: Permissions,
    ) -> Result<(), ConfigError> {
        let variant_name = variant_name.into();
        let g = self.group_mut(group)?;
        if g.variants.contains_key(&variant_name) {
            return Err(ConfigError::DuplicateVariant { group, variant: variant_name });
        }
        g.variants.insert(variant_name, Variant { target, phys_base, perms });
        Ok(())
    }

    /// Select the active variant. The caller (the bus) is responsible
    /// for rewriting the page table entries within the group's range as
    /// a single transaction immediately after this returns.
    pub fn select_variant(&mut self, group: GroupId, variant_name: &str) -> Result<Variant, ConfigError> {
        let g = self.group_mut(group)?;
        let variant = *g
            .variants
            .get(variant_name)
            .ok_or_else(|| ConfigError::UnknownVariant { group, variant: variant_name.to_string() })?;
        g.active = Some(variant_name.to_string());
        log::info!("swap group '{}' selected variant '{}'", g.name, variant_name);
        Ok(variant)
    }

    #[must_use]
    pub fn get(&self, group: GroupId) -> Option<&SwapGroup> {
        self.groups.get(group.0 as usize)
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<GroupId> {
        self.by_name.get(name).copied()
    }

    fn group_mut(&mut self, group: GroupId) -> Result<&mut SwapGroup, ConfigError> {
        self.groups
            .get_mut(group.0 as usize)
            .ok_or(ConfigError::UnknownGroup(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_group_name_rejected() {
        let mut reg = SwapGroupRegistry::new();
        reg.create_group("lc", Addr::new(0xD000), 0x1000).unwrap();
        assert!(reg.create_group("lc", Addr::new(0xD000), 0x1000).is_err());
    }

    #[test]
    fn duplicate_variant_name_rejected() {
        let mut reg = SwapGroupRegistry::new();
        let g = reg.create_group("lc", Addr::new(0xD000), 0x1000).unwrap();
        reg.add_variant(g, "bank1", TargetId(0), 0, Permissions::RW).unwrap();
        assert!(reg.add_variant(g, "bank1", TargetId(1), 0, Permissions::RW).is_err());
    }

    #[test]
    fn select_variant_updates_active() {
        let mut reg = SwapGroupRegistry::new();
        let g = reg.create_group("lc", Addr::new(0xD000), 0x1000).unwrap();
        reg.add_variant(g, "bank1", TargetId(0), 0, Permissions::RW).unwrap();
        reg.add_variant(g, "bank2", TargetId(1), 0, Permissions::RW).unwrap();
        reg.select_variant(g, "bank2").unwrap();
        assert_eq!(reg.get(g).unwrap().active_variant_name(), Some("bank2"));
    }
}
