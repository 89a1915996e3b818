//! Spatial Memory
//!
//! What an agent knows of the world layout: world -> sector -> arena ->
//! objects. The tree only grows, and only through perception.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::address::{Address, AddressLevel};

pub type ArenaTree = BTreeMap<String, BTreeSet<String>>;
pub type SectorTree = BTreeMap<String, ArenaTree>;
pub type WorldTree = BTreeMap<String, SectorTree>;

/// Component: an agent's known location hierarchy.
#[derive(Component, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialMemory {
    tree: WorldTree,
}

impl SpatialMemory {
    /// A tree that already knows the agent's living area.
    pub fn new(living_area: &Address) -> Self {
        let mut memory = Self::default();
        memory.observe(living_area);
        memory
    }

    /// Seeds from a bootstrap tree, then inserts the living area.
    pub fn from_tree(tree: WorldTree, living_area: &Address) -> Self {
        let mut memory = Self { tree };
        memory.observe(living_area);
        memory
    }

    pub fn tree(&self) -> &WorldTree {
        &self.tree
    }

    /// Records every level of `address`. Returns true if anything was new.
    pub fn observe(&mut self, address: &Address) -> bool {
        let before = self.len();
        let sectors = self.tree.entry(address.world_name().to_string()).or_default();
        let world_new = sectors.is_empty() && address.sector().is_none();

        if let Some(sector) = address.sector() {
            let arenas = sectors.entry(sector.to_string()).or_default();
            if let Some(arena) = address.arena() {
                let objects = arenas.entry(arena.to_string()).or_default();
                if let Some(object) = address.object() {
                    objects.insert(object.to_string());
                }
            }
        }
        world_new || self.len() != before
    }

    /// True when every component of `address` is known.
    pub fn contains(&self, address: &Address) -> bool {
        let Some(sectors) = self.tree.get(address.world_name()) else {
            return false;
        };
        let Some(sector) = address.sector() else {
            return true;
        };
        let Some(arenas) = sectors.get(sector) else {
            return false;
        };
        let Some(arena) = address.arena() else {
            return true;
        };
        let Some(objects) = arenas.get(arena) else {
            return false;
        };
        address.object().map_or(true, |o| objects.contains(o))
    }

    pub fn sectors(&self, world: &str) -> Vec<String> {
        self.tree
            .get(world)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn arenas(&self, world: &str, sector: &str) -> Vec<String> {
        self.tree
            .get(world)
            .and_then(|s| s.get(sector))
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn objects(&self, world: &str, sector: &str, arena: &str) -> Vec<String> {
        self.tree
            .get(world)
            .and_then(|s| s.get(sector))
            .and_then(|a| a.get(arena))
            .map(|o| o.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Known children of `address` one level down.
    pub fn children(&self, address: &Address) -> Vec<String> {
        let world = address.world_name();
        match (address.level(), address.sector(), address.arena()) {
            (AddressLevel::World, _, _) => self.sectors(world),
            (AddressLevel::Sector, Some(sector), _) => self.arenas(world, sector),
            (AddressLevel::Arena, Some(sector), Some(arena)) => self.objects(world, sector, arena),
            _ => Vec::new(),
        }
    }

    /// Number of known nodes at sector, arena and object level.
    pub fn len(&self) -> usize {
        self.tree
            .values()
            .flat_map(|sectors| sectors.values())
            .map(|arenas| 1 + arenas.values().map(|objects| 1 + objects.len()).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// True when every address known to `earlier` is still known here.
    pub fn includes(&self, earlier: &SpatialMemory) -> bool {
        earlier.addresses().iter().all(|a| self.contains(a))
    }

    /// Every known address at every level.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        for (world, sectors) in &self.tree {
            let Ok(world_addr) = Address::world(world) else {
                continue;
            };
            for (sector, arenas) in sectors {
                let Ok(sector_addr) = world_addr.child(sector) else {
                    continue;
                };
                for (arena, objects) in arenas {
                    let Ok(arena_addr) = sector_addr.child(arena) else {
                        continue;
                    };
                    out.extend(objects.iter().filter_map(|o| arena_addr.child(o).ok()));
                    out.push(arena_addr);
                }
                out.push(sector_addr);
            }
            out.push(world_addr);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_living_area_present_at_construction() {
        let home = addr("town:Lin House:bedroom");
        let mem = SpatialMemory::new(&home);
        assert!(mem.contains(&home));
        assert!(mem.contains(&addr("town:Lin House")));
        assert_eq!(mem.sectors("town"), vec!["Lin House".to_string()]);
        assert!(mem.objects("town", "Lin House", "bedroom").is_empty());
    }

    #[test]
    fn test_observe_reports_growth() {
        let mut mem = SpatialMemory::new(&addr("town:Home:kitchen"));
        assert!(mem.observe(&addr("town:Cafe:cafe:counter")));
        assert!(!mem.observe(&addr("town:Cafe:cafe:counter")));
        assert!(!mem.observe(&addr("town:Cafe")));
        assert_eq!(mem.objects("town", "Cafe", "cafe"), vec!["counter".to_string()]);
    }

    #[test]
    fn test_contains_requires_every_level() {
        let mut mem = SpatialMemory::new(&addr("town:Home:kitchen"));
        mem.observe(&addr("town:Cafe:cafe:counter"));
        assert!(mem.contains(&addr("town:Cafe:cafe")));
        assert!(!mem.contains(&addr("town:Cafe:cafe:stove")));
        assert!(!mem.contains(&addr("town:Park")));
        assert!(!mem.contains(&addr("city:Cafe")));
    }

    #[test]
    fn test_children_by_level() {
        let mut mem = SpatialMemory::new(&addr("town:Home:kitchen:stove"));
        mem.observe(&addr("town:Home:bedroom:bed"));
        assert_eq!(
            mem.children(&addr("town:Home")),
            vec!["bedroom".to_string(), "kitchen".to_string()]
        );
        assert_eq!(mem.children(&addr("town:Home:kitchen")), vec!["stove".to_string()]);
        assert!(mem.children(&addr("town:Home:kitchen:stove")).is_empty());
    }

    #[test]
    fn test_includes_is_monotonic() {
        let mut mem = SpatialMemory::new(&addr("town:Home:kitchen"));
        let before = mem.clone();
        mem.observe(&addr("town:Cafe:cafe:counter"));
        assert!(mem.includes(&before));
        assert!(!before.includes(&mem));
        assert_eq!(mem.len(), before.len() + 3);
    }
}
