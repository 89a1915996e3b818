//! Where an action happens and how to get there.

use rand::Rng;
use town_events::Coord;
use tracing::{debug, warn};

use crate::components::scratch::is_sleep_activity;
use crate::components::{Address, Persona, SpatialMemory, WorldGrid};
use crate::error::UnreachableError;
use crate::generation::{prompts, Capabilities, PromptKind};

/// Asks for one option, falling back to `preferred` when it is offered,
/// else the first option.
fn choose(
    caps: &Capabilities,
    kind: PromptKind,
    persona: &Persona,
    description: &str,
    within: &str,
    options: Vec<String>,
    preferred: &str,
) -> Option<String> {
    let fallback = options
        .iter()
        .find(|o| o.as_str() == preferred)
        .or_else(|| options.first())
        .cloned()?;
    let prompt = prompts::action_location(kind, persona, description, within, options, preferred);
    Some(caps.ask_choice(&prompt).unwrap_or_else(|err| {
        debug!("{}: {:?} fallback {:?}: {}", persona.name, kind, fallback, err);
        fallback
    }))
}

/// Picks sector, arena and object for an activity, one level at a time,
/// from places the agent knows. Stops at the deepest level with options.
pub fn resolve_location(
    persona: &Persona,
    spatial: &SpatialMemory,
    caps: &Capabilities,
    description: &str,
) -> Result<Address, UnreachableError> {
    let home = &persona.living_area;
    let world = home.world_name();
    let unknown = || UnreachableError::UnknownLocation(format!("{} ({})", description, world));

    let sector = choose(
        caps,
        PromptKind::ActionSector,
        persona,
        description,
        world,
        spatial.sectors(world),
        home.sector().unwrap_or(""),
    )
    .ok_or_else(unknown)?;

    let same_sector = home.sector() == Some(sector.as_str());
    let Some(arena) = choose(
        caps,
        PromptKind::ActionArena,
        persona,
        description,
        &sector,
        spatial.arenas(world, &sector),
        if same_sector { home.arena().unwrap_or("") } else { "" },
    ) else {
        return Address::from_components(&[world, &sector]).map_err(|_| unknown());
    };

    let same_arena = same_sector && home.arena() == Some(arena.as_str());
    let object = choose(
        caps,
        PromptKind::ActionObject,
        persona,
        description,
        &arena,
        spatial.objects(world, &sector, &arena),
        if same_arena { home.object().unwrap_or("") } else { "" },
    );
    let address = match object {
        Some(object) => Address::from_components(&[world, &sector, &arena, &object]),
        None => Address::from_components(&[world, &sector, &arena]),
    };
    address.map_err(|_| unknown())
}

/// Shortest path to the nearest tile of `address`.
pub fn route<R: Rng>(
    grid: &WorldGrid,
    from: Coord,
    address: &Address,
    rng: &mut R,
) -> Result<Vec<Coord>, UnreachableError> {
    let tiles = grid.tiles_in(address);
    if tiles.is_empty() {
        return Err(UnreachableError::UnknownLocation(address.to_string()));
    }
    grid.nearest_reachable(from, &tiles, rng)
}

/// Destination and path for an activity.
///
/// Sleep always happens in the living area. When the chosen place cannot be
/// reached the agent heads home instead, and stays put if home is out of
/// reach too.
#[allow(clippy::too_many_arguments)]
pub fn choose_destination<R: Rng>(
    persona: &Persona,
    spatial: &SpatialMemory,
    grid: &WorldGrid,
    caps: &Capabilities,
    description: &str,
    planned: Option<&Address>,
    from: Coord,
    rng: &mut R,
) -> (Address, Vec<Coord>) {
    let home = &persona.living_area;
    let resolved = if is_sleep_activity(description) {
        Ok(home.clone())
    } else {
        match planned.filter(|a| spatial.contains(a)) {
            Some(address) => Ok(address.clone()),
            None => resolve_location(persona, spatial, caps, description),
        }
    };

    let found = resolved.and_then(|address| route(grid, from, &address, rng).map(|path| (address, path)));
    match found {
        Ok(found) => found,
        Err(err) => {
            warn!("{}: cannot go {}: {}; heading to {}", persona.name, description, err, home);
            match route(grid, from, home, rng) {
                Ok(path) => (home.clone(), path),
                Err(err) => {
                    warn!("{}: living area unreachable, staying put: {}", persona.name, err);
                    (home.clone(), Vec::new())
                }
            }
        }
    }
}
