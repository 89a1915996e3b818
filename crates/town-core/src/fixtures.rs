//! Test fixtures.
//!
//! A small two-building town and two agents. Enable the `test-fixtures`
//! feature to use these from integration tests.
//!
//! ```text
//!   x: 0 1 2 3 4 5 6 7 8 9
//! y=0  B . . S # # . . C .     Lin House (x 0-3): bedroom x 0-1, kitchen x 2-3
//! y=1  . a . . # # . b . .     Hobbs Cafe (x 6-9): cafe
//! y=2  . . . . # # . T . .
//! y=3  . . . . . . . . . .     street
//! y=4  . . . . . . . . . .
//! ```
//!
//! B bed, S stove, C counter, T table, a/b spawn points, # wall.

use std::collections::BTreeMap;
use town_events::Coord;

use crate::components::spatial::WorldTree;
use crate::components::{Address, CognitiveParams, WorldGrid};
use crate::config::SimConfig;
use crate::setup::{AgentBootstrap, SeedMemory, SpawnPoint, WorldDefinition};

pub const WORLD: &str = "the Ville";
pub const WIDTH: usize = 10;
pub const HEIGHT: usize = 5;

fn names(pairs: &[(u32, &str)]) -> BTreeMap<u32, String> {
    pairs.iter().map(|(id, name)| (*id, name.to_string())).collect()
}

fn layer(f: impl Fn(usize, usize) -> u32) -> Vec<Vec<u32>> {
    (0..HEIGHT)
        .map(|y| (0..WIDTH).map(|x| f(x, y)).collect())
        .collect()
}

pub fn address(path: &str) -> Address {
    format!("{}:{}", WORLD, path)
        .parse()
        .unwrap_or_else(|e| panic!("bad fixture address {}: {}", path, e))
}

pub fn town_definition() -> WorldDefinition {
    WorldDefinition {
        world: WORLD.to_string(),
        width: WIDTH,
        height: HEIGHT,
        collision: layer(|x, y| u32::from((x == 4 || x == 5) && y < 3)),
        sectors: layer(|x, y| match (x, y) {
            (0..=3, 0..=2) => 1,
            (6..=9, 0..=2) => 2,
            _ => 0,
        }),
        arenas: layer(|x, y| match (x, y) {
            (0..=1, 0..=2) => 1,
            (2..=3, 0..=2) => 2,
            (6..=9, 0..=2) => 3,
            _ => 0,
        }),
        objects: layer(|x, y| match (x, y) {
            (0, 0) => 1,
            (3, 0) => 2,
            (8, 0) => 3,
            (7, 2) => 4,
            _ => 0,
        }),
        spawns: layer(|x, y| match (x, y) {
            (1, 1) => 1,
            (7, 1) => 2,
            _ => 0,
        }),
        sector_names: names(&[(1, "Lin House"), (2, "Hobbs Cafe")]),
        arena_names: names(&[(1, "bedroom"), (2, "kitchen"), (3, "cafe")]),
        object_names: names(&[(1, "bed"), (2, "stove"), (3, "counter"), (4, "table")]),
        spawn_names: names(&[(1, "lin-bedroom"), (2, "cafe-floor")]),
    }
}

pub fn town_grid() -> WorldGrid {
    town_definition()
        .build()
        .unwrap_or_else(|e| panic!("fixture world is invalid: {}", e))
}

fn known_places(places: &[(&str, &str, &[&str])]) -> WorldTree {
    let mut tree = WorldTree::new();
    let sectors = tree.entry(WORLD.to_string()).or_default();
    for (sector, arena, objects) in places {
        sectors
            .entry(sector.to_string())
            .or_default()
            .entry(arena.to_string())
            .or_default()
            .extend(objects.iter().map(|o| o.to_string()));
    }
    tree
}

pub fn ada() -> AgentBootstrap {
    AgentBootstrap {
        id: "ada".into(),
        name: "Ada Lin".into(),
        age: 34,
        innate: "curious, warm, methodical".into(),
        learned: "Ada Lin is a painter who lives with her family".into(),
        currently: "Ada Lin is preparing a gallery show".into(),
        lifestyle: "goes to bed around 11pm, wakes up around 7am".into(),
        living_area: address("Lin House:bedroom"),
        params: CognitiveParams::default(),
        spatial: known_places(&[
            ("Lin House", "bedroom", &["bed"]),
            ("Lin House", "kitchen", &["stove"]),
            ("Hobbs Cafe", "cafe", &["counter", "table"]),
        ]),
        memories: vec![SeedMemory::new("Ada Lin buys coffee at Hobbs Cafe most mornings")],
        spawn: SpawnPoint::Named("lin-bedroom".into()),
    }
}

pub fn bo() -> AgentBootstrap {
    AgentBootstrap {
        id: "bo".into(),
        name: "Bo Hobbs".into(),
        age: 41,
        innate: "friendly, outgoing, hospitable".into(),
        learned: "Bo Hobbs runs Hobbs Cafe".into(),
        currently: "Bo Hobbs is planning a party at the cafe".into(),
        lifestyle: "goes to bed around 10pm, wakes up around 6am".into(),
        living_area: address("Hobbs Cafe:cafe"),
        params: CognitiveParams::default(),
        spatial: known_places(&[("Hobbs Cafe", "cafe", &["counter", "table"])]),
        memories: vec![SeedMemory::new("Bo Hobbs knows Ada Lin as a regular")],
        spawn: SpawnPoint::Named("cafe-floor".into()),
    }
}

pub fn bootstraps() -> Vec<AgentBootstrap> {
    vec![ada(), bo()]
}

/// Two agents spawned side by side on the street.
pub fn neighbours() -> Vec<AgentBootstrap> {
    let mut ada = ada();
    ada.spawn = SpawnPoint::At(Coord::new(4, 3));
    let mut bo = bo();
    bo.spawn = SpawnPoint::At(Coord::new(5, 3));
    vec![ada, bo]
}

/// Mid-morning start, one simulated minute per step.
pub fn test_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.clock.start_hour = 9;
    config.clock.seconds_per_step = 60;
    config.clock.seed = 7;
    config
}
