//! World Grid
//!
//! The tile map agents live on: one hierarchical address and a collision flag
//! per tile, plus per-step occupancy and event annotations written by the
//! commit system. Shortest paths are breadth-first on the 4-connected grid.

use bevy_ecs::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use town_events::Coord;

use super::address::{Address, AddressLevel};
use super::memory::Triple;
use crate::error::UnreachableError;

/// Something happening on a tile, as seen by agents nearby.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileEvent {
    pub triple: Triple,
    pub description: String,
}

impl TileEvent {
    pub fn new(triple: Triple, description: impl Into<String>) -> Self {
        Self {
            triple,
            description: description.into(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.description.contains("is idle")
            || (self.triple.predicate == "is" && self.triple.object == "idle")
    }
}

/// A single grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub address: Address,
    pub walkable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn: Option<String>,
    /// Agent id to current activity description.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub occupants: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub events: BTreeSet<TileEvent>,
}

impl Tile {
    pub fn new(address: Address, walkable: bool) -> Self {
        Self {
            address,
            walkable,
            spawn: None,
            occupants: BTreeMap::new(),
            events: BTreeSet::new(),
        }
    }
}

/// Resource: the authoritative tile map.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldGrid {
    width: u32,
    height: u32,
    /// Row-major.
    tiles: Vec<Tile>,
}

impl WorldGrid {
    /// A grid where every tile is walkable and carries only the world address.
    pub fn new(width: u32, height: u32, world: &Address) -> Self {
        let world = world.truncate(AddressLevel::World);
        Self {
            width,
            height,
            tiles: vec![Tile::new(world, true); (width * height) as usize],
        }
    }

    /// Builds a grid from row-major tiles. Returns `None` on a length mismatch.
    pub fn from_tiles(width: u32, height: u32, tiles: Vec<Tile>) -> Option<Self> {
        (tiles.len() == (width * height) as usize).then_some(Self {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn world_address(&self) -> Option<Address> {
        self.tiles
            .first()
            .map(|t| t.address.truncate(AddressLevel::World))
    }

    pub fn in_bounds(&self, at: Coord) -> bool {
        at.x < self.width && at.y < self.height
    }

    fn index(&self, at: Coord) -> Option<usize> {
        self.in_bounds(at)
            .then(|| (at.y * self.width + at.x) as usize)
    }

    fn coord_of(&self, index: usize) -> Coord {
        let index = index as u32;
        Coord::new(index % self.width, index / self.width)
    }

    pub fn tile(&self, at: Coord) -> Option<&Tile> {
        self.index(at).map(|i| &self.tiles[i])
    }

    pub fn tile_mut(&mut self, at: Coord) -> Option<&mut Tile> {
        self.index(at).map(move |i| &mut self.tiles[i])
    }

    pub fn is_walkable(&self, at: Coord) -> bool {
        self.tile(at).is_some_and(|t| t.walkable)
    }

    /// Row-major iterator over every tile.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, &Tile)> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(i, tile)| (self.coord_of(i), tile))
    }

    /// In-bounds tiles within Chebyshev distance `radius` of `center`, row-major.
    pub fn tiles_near(&self, center: Coord, radius: u32) -> TilesNear<'_> {
        TilesNear::new(self, center, radius)
    }

    /// The arena-level address of a tile, if the tile lies inside an arena.
    pub fn arena_of(&self, at: Coord) -> Option<Address> {
        self.tile(at)
            .filter(|t| t.address.level() >= AddressLevel::Arena)
            .map(|t| t.address.truncate(AddressLevel::Arena))
    }

    /// Coordinates whose address matches every given component.
    pub fn find_address(
        &self,
        sector: Option<&str>,
        arena: Option<&str>,
        object: Option<&str>,
    ) -> Vec<Coord> {
        self.iter()
            .filter(|(_, tile)| tile.address.level() > AddressLevel::World)
            .filter(|(_, tile)| tile.address.matches(sector, arena, object))
            .map(|(at, _)| at)
            .collect()
    }

    /// Coordinates lying inside `address` (the address itself or any descendant).
    pub fn tiles_in(&self, address: &Address) -> Vec<Coord> {
        self.iter()
            .filter(|(_, tile)| address.contains(&tile.address))
            .map(|(at, _)| at)
            .collect()
    }

    pub fn spawn_point(&self, name: &str) -> Option<Coord> {
        self.iter()
            .find(|(_, tile)| tile.spawn.as_deref() == Some(name))
            .map(|(at, _)| at)
    }

    /// Walkable 4-neighbours in a fixed order: up, left, right, down.
    fn neighbors(&self, at: Coord) -> impl Iterator<Item = Coord> + '_ {
        let candidates = [
            at.y.checked_sub(1).map(|y| Coord::new(at.x, y)),
            at.x.checked_sub(1).map(|x| Coord::new(x, at.y)),
            Some(Coord::new(at.x + 1, at.y)),
            Some(Coord::new(at.x, at.y + 1)),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter(move |c| self.is_walkable(*c))
    }

    /// Breadth-first distances and parents from `from`, until `stop_at` holds.
    fn bfs(
        &self,
        from: Coord,
        stop_at: impl Fn(&HashMap<Coord, (u32, Coord)>) -> bool,
    ) -> HashMap<Coord, (u32, Coord)> {
        let mut visited: HashMap<Coord, (u32, Coord)> = HashMap::new();
        let mut queue = VecDeque::new();

        visited.insert(from, (0, from));
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if stop_at(&visited) {
                break;
            }
            let dist = visited[&current].0;
            for next in self.neighbors(current) {
                if !visited.contains_key(&next) {
                    visited.insert(next, (dist + 1, current));
                    queue.push_back(next);
                }
            }
        }

        visited
    }

    fn backtrack(visited: &HashMap<Coord, (u32, Coord)>, from: Coord, to: Coord) -> Vec<Coord> {
        let mut path = Vec::new();
        let mut step = to;
        while step != from {
            path.push(step);
            match visited.get(&step) {
                Some((_, prev)) => step = *prev,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Shortest walkable path. The result excludes `from` and ends at `to`.
    pub fn shortest_path(&self, from: Coord, to: Coord) -> Result<Vec<Coord>, UnreachableError> {
        let unreachable = UnreachableError::NoPath { from, to };
        if !self.in_bounds(from) || !self.is_walkable(to) {
            return Err(unreachable);
        }
        if from == to {
            return Ok(Vec::new());
        }

        let visited = self.bfs(from, |v| v.contains_key(&to));
        if !visited.contains_key(&to) {
            return Err(unreachable);
        }
        Ok(Self::backtrack(&visited, from, to))
    }

    /// Path to the closest reachable tile among `targets`.
    ///
    /// Targets at equal distance are chosen between with `rng`.
    pub fn nearest_reachable<R: Rng>(
        &self,
        from: Coord,
        targets: &[Coord],
        rng: &mut R,
    ) -> Result<Vec<Coord>, UnreachableError> {
        let wanted: BTreeSet<Coord> = targets
            .iter()
            .copied()
            .filter(|c| self.is_walkable(*c))
            .collect();
        let unreachable = UnreachableError::NoReachableTarget {
            from,
            candidates: targets.len(),
        };
        if wanted.is_empty() || !self.in_bounds(from) {
            return Err(unreachable);
        }
        if wanted.contains(&from) {
            return Ok(Vec::new());
        }

        let visited = self.bfs(from, |_| false);
        let best = wanted
            .iter()
            .filter_map(|c| visited.get(c).map(|(d, _)| *d))
            .min()
            .ok_or(unreachable)?;
        let nearest: Vec<Coord> = wanted
            .iter()
            .copied()
            .filter(|c| visited.get(c).is_some_and(|(d, _)| *d == best))
            .collect();

        let chosen = nearest[rng.gen_range(0..nearest.len())];
        Ok(Self::backtrack(&visited, from, chosen))
    }

    /// Removes every occupant and event annotation.
    pub fn clear_annotations(&mut self) {
        for tile in &mut self.tiles {
            tile.occupants.clear();
            tile.events.clear();
        }
    }

    pub fn place_occupant(&mut self, at: Coord, agent: &str, activity: &str) -> bool {
        match self.tile_mut(at) {
            Some(tile) => {
                tile.occupants.insert(agent.to_string(), activity.to_string());
                true
            }
            None => false,
        }
    }

    pub fn add_event(&mut self, at: Coord, event: TileEvent) -> bool {
        match self.tile_mut(at) {
            Some(tile) => tile.events.insert(event),
            None => false,
        }
    }
}

/// Restartable iterator over the square neighbourhood of a tile.
#[derive(Debug, Clone)]
pub struct TilesNear<'a> {
    grid: &'a WorldGrid,
    x_min: u32,
    x_max: u32,
    y_max: u32,
    next: Option<Coord>,
}

impl<'a> TilesNear<'a> {
    fn new(grid: &'a WorldGrid, center: Coord, radius: u32) -> Self {
        let x_min = center.x.saturating_sub(radius);
        let y_min = center.y.saturating_sub(radius);
        let x_max = center.x.saturating_add(radius).min(grid.width.saturating_sub(1));
        let y_max = center.y.saturating_add(radius).min(grid.height.saturating_sub(1));
        let next = (grid.width > 0 && grid.height > 0 && x_min <= x_max && y_min <= y_max)
            .then(|| Coord::new(x_min, y_min));
        Self {
            grid,
            x_min,
            x_max,
            y_max,
            next,
        }
    }
}

impl<'a> Iterator for TilesNear<'a> {
    type Item = (Coord, &'a Tile);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = if current.x < self.x_max {
            Some(Coord::new(current.x + 1, current.y))
        } else if current.y < self.y_max {
            Some(Coord::new(self.x_min, current.y + 1))
        } else {
            None
        };
        self.grid.tile(current).map(|tile| (current, tile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn open_grid(w: u32, h: u32) -> WorldGrid {
        WorldGrid::new(w, h, &"town".parse().unwrap())
    }

    fn block(grid: &mut WorldGrid, cells: &[(u32, u32)]) {
        for &(x, y) in cells {
            grid.tile_mut(Coord::new(x, y)).unwrap().walkable = false;
        }
    }

    #[test]
    fn test_tiles_near_clips_to_bounds() {
        let grid = open_grid(5, 5);
        let near: Vec<Coord> = grid.tiles_near(Coord::new(0, 0), 1).map(|(c, _)| c).collect();
        assert_eq!(
            near,
            vec![Coord::new(0, 0), Coord::new(1, 0), Coord::new(0, 1), Coord::new(1, 1)]
        );
        assert_eq!(grid.tiles_near(Coord::new(2, 2), 3).count(), 25);
    }

    #[test]
    fn test_tiles_near_is_restartable() {
        let grid = open_grid(6, 6);
        let iter = grid.tiles_near(Coord::new(3, 3), 1);
        let first: Vec<Coord> = iter.clone().map(|(c, _)| c).collect();
        let second: Vec<Coord> = iter.map(|(c, _)| c).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 9);
    }

    #[test]
    fn test_shortest_path_excludes_start() {
        let grid = open_grid(4, 1);
        let path = grid.shortest_path(Coord::new(0, 0), Coord::new(3, 0)).unwrap();
        assert_eq!(path, vec![Coord::new(1, 0), Coord::new(2, 0), Coord::new(3, 0)]);
        assert!(grid.shortest_path(Coord::new(2, 0), Coord::new(2, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_shortest_path_routes_around_walls() {
        let mut grid = open_grid(3, 3);
        block(&mut grid, &[(1, 0), (1, 1)]);
        let path = grid.shortest_path(Coord::new(0, 0), Coord::new(2, 0)).unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path.last(), Some(&Coord::new(2, 0)));
        assert!(path.iter().all(|c| grid.is_walkable(*c)));
    }

    #[test]
    fn test_no_path_into_enclosed_room() {
        let mut grid = open_grid(5, 5);
        block(&mut grid, &[(2, 1), (1, 2), (3, 2), (2, 3)]);
        let err = grid.shortest_path(Coord::new(0, 0), Coord::new(2, 2)).unwrap_err();
        assert_eq!(
            err,
            UnreachableError::NoPath {
                from: Coord::new(0, 0),
                to: Coord::new(2, 2)
            }
        );
    }

    #[test]
    fn test_no_path_to_blocked_or_outside() {
        let mut grid = open_grid(3, 3);
        block(&mut grid, &[(2, 2)]);
        assert!(grid.shortest_path(Coord::new(0, 0), Coord::new(2, 2)).is_err());
        assert!(grid.shortest_path(Coord::new(0, 0), Coord::new(9, 9)).is_err());
    }

    #[test]
    fn test_nearest_reachable_picks_closest() {
        let grid = open_grid(6, 1);
        let mut rng = SmallRng::seed_from_u64(1);
        let path = grid
            .nearest_reachable(Coord::new(0, 0), &[Coord::new(5, 0), Coord::new(2, 0)], &mut rng)
            .unwrap();
        assert_eq!(path, vec![Coord::new(1, 0), Coord::new(2, 0)]);
    }

    #[test]
    fn test_nearest_reachable_is_seeded() {
        let grid = open_grid(5, 1);
        let targets = [Coord::new(0, 0), Coord::new(4, 0)];
        let a = grid
            .nearest_reachable(Coord::new(2, 0), &targets, &mut SmallRng::seed_from_u64(9))
            .unwrap();
        let b = grid
            .nearest_reachable(Coord::new(2, 0), &targets, &mut SmallRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_find_address_partial() {
        let mut grid = open_grid(3, 1);
        let world: Address = "town".parse().unwrap();
        grid.tile_mut(Coord::new(1, 0)).unwrap().address =
            world.child("Cafe").unwrap().child("cafe").unwrap();
        grid.tile_mut(Coord::new(2, 0)).unwrap().address = world
            .child("Cafe")
            .unwrap()
            .child("cafe")
            .unwrap()
            .child("counter")
            .unwrap();

        assert_eq!(grid.find_address(Some("Cafe"), None, None).len(), 2);
        assert_eq!(
            grid.find_address(None, None, Some("counter")),
            vec![Coord::new(2, 0)]
        );
        assert_eq!(
            grid.arena_of(Coord::new(2, 0)).unwrap().to_string(),
            "town:Cafe:cafe"
        );
        assert!(grid.arena_of(Coord::new(0, 0)).is_none());
    }

    #[test]
    fn test_annotations_clear() {
        let mut grid = open_grid(2, 2);
        assert!(grid.place_occupant(Coord::new(1, 1), "ada", "reading"));
        grid.add_event(
            Coord::new(1, 1),
            TileEvent::new(Triple::new("ada", "is", "reading"), "ada is reading"),
        );
        assert_eq!(grid.tile(Coord::new(1, 1)).unwrap().events.len(), 1);

        grid.clear_annotations();
        let tile = grid.tile(Coord::new(1, 1)).unwrap();
        assert!(tile.occupants.is_empty());
        assert!(tile.events.is_empty());
    }
}
