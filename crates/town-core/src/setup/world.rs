//! World Setup
//!
//! Builds the `WorldGrid` from a JSON world definition: a collision layer,
//! sector / arena / object / spawn id layers of the same dimensions, and id to
//! name tables. Id 0 means "nothing here" in every layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use town_events::Coord;

use crate::components::{Address, Tile, WorldGrid};
use crate::error::ConfigurationError;

pub type IdGrid = Vec<Vec<u32>>;

/// The on-disk world layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDefinition {
    pub world: String,
    pub width: usize,
    pub height: usize,
    /// Non-zero tiles are blocked.
    pub collision: IdGrid,
    #[serde(default)]
    pub sectors: IdGrid,
    #[serde(default)]
    pub arenas: IdGrid,
    #[serde(default)]
    pub objects: IdGrid,
    #[serde(default)]
    pub spawns: IdGrid,
    #[serde(default)]
    pub sector_names: BTreeMap<u32, String>,
    #[serde(default)]
    pub arena_names: BTreeMap<u32, String>,
    #[serde(default)]
    pub object_names: BTreeMap<u32, String>,
    #[serde(default)]
    pub spawn_names: BTreeMap<u32, String>,
}

/// One id layer with its name table. An empty layer is all zeros.
struct Layer<'a> {
    name: &'static str,
    grid: &'a IdGrid,
    names: &'a BTreeMap<u32, String>,
}

impl<'a> Layer<'a> {
    fn check_dimensions(&self, width: usize, height: usize) -> Result<(), ConfigurationError> {
        if self.grid.is_empty() {
            return Ok(());
        }
        let found_width = self.grid.iter().map(Vec::len).find(|w| *w != width).unwrap_or(width);
        if self.grid.len() != height || found_width != width {
            return Err(ConfigurationError::DimensionMismatch {
                layer: self.name,
                width,
                height,
                found_width,
                found_height: self.grid.len(),
            });
        }
        Ok(())
    }

    fn name_at(&self, at: Coord) -> Result<Option<&'a str>, ConfigurationError> {
        let id = self
            .grid
            .get(at.y as usize)
            .and_then(|row| row.get(at.x as usize))
            .copied()
            .unwrap_or(0);
        if id == 0 {
            return Ok(None);
        }
        self.names
            .get(&id)
            .map(|name| Some(name.as_str()))
            .ok_or(ConfigurationError::UnmappedId {
                layer: self.name,
                id,
                at,
            })
    }
}

impl WorldDefinition {
    fn layers(&self) -> [Layer<'_>; 4] {
        [
            Layer { name: "sector", grid: &self.sectors, names: &self.sector_names },
            Layer { name: "arena", grid: &self.arenas, names: &self.arena_names },
            Layer { name: "object", grid: &self.objects, names: &self.object_names },
            Layer { name: "spawn", grid: &self.spawns, names: &self.spawn_names },
        ]
    }

    fn address_at(&self, at: Coord, names: [Option<&str>; 3]) -> Result<Address, ConfigurationError> {
        let parents = ["world", "sector", "arena"];
        let children = ["sector", "arena", "object"];
        let mut components = vec![self.world.as_str()];
        for (level, name) in names.into_iter().enumerate() {
            match name {
                Some(name) if components.len() == level + 1 => components.push(name),
                Some(_) => {
                    return Err(ConfigurationError::BrokenNesting {
                        at,
                        child: children[level],
                        parent: parents[level],
                    })
                }
                None => {}
            }
        }
        Address::from_components(&components).map_err(|source| ConfigurationError::Address {
            input: components.join(":"),
            source,
        })
    }

    /// Validates every layer and builds the grid.
    pub fn build(&self) -> Result<WorldGrid, ConfigurationError> {
        let width = self.width;
        let height = self.height;
        if width == 0 || height == 0 {
            return Err(ConfigurationError::InvalidSetting {
                field: "world.dimensions",
                reason: "width and height must be positive".to_string(),
            });
        }
        let collision = Layer {
            name: "collision",
            grid: &self.collision,
            names: &BTreeMap::new(),
        };
        if self.collision.is_empty() {
            return Err(ConfigurationError::DimensionMismatch {
                layer: "collision",
                width,
                height,
                found_width: 0,
                found_height: 0,
            });
        }
        collision.check_dimensions(width, height)?;
        let layers = self.layers();
        for layer in &layers {
            layer.check_dimensions(width, height)?;
        }

        let mut tiles = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let at = Coord::new(x as u32, y as u32);
                let [sector, arena, object, spawn] = [
                    layers[0].name_at(at)?,
                    layers[1].name_at(at)?,
                    layers[2].name_at(at)?,
                    layers[3].name_at(at)?,
                ];
                let address = self.address_at(at, [sector, arena, object])?;
                let mut tile = Tile::new(address, self.collision[y][x] == 0);
                tile.spawn = spawn.map(str::to_string);
                tiles.push(tile);
            }
        }
        WorldGrid::from_tiles(width as u32, height as u32, tiles).ok_or(
            ConfigurationError::DimensionMismatch {
                layer: "collision",
                width,
                height,
                found_width: width,
                found_height: height,
            },
        )
    }
}

/// Reads a world definition from JSON and builds its grid.
pub fn load_world(path: &Path) -> Result<WorldGrid, ConfigurationError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let definition: WorldDefinition =
        serde_json::from_str(&content).map_err(|source| ConfigurationError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    definition.build()
}
