//! Hierarchical location addresses.
//!
//! Every tile belongs to a world and optionally to a sector, an arena inside
//! that sector, and an object inside that arena. Addresses are structured
//! values; the `world:sector:arena:object` string form only appears at I/O
//! boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Depth of an address in the location hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressLevel {
    World,
    Sector,
    Arena,
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("{0} name is blank")]
    BlankComponent(&'static str),
    #[error("too many components ({0}, at most 4)")]
    TooDeep(usize),
    #[error("cannot descend below an object")]
    BelowObject,
}

/// A validated location address. Object implies arena implies sector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    world: String,
    sector: Option<String>,
    arena: Option<String>,
    object: Option<String>,
}

fn checked(name: &str, level: &'static str) -> Result<String, AddressError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AddressError::BlankComponent(level));
    }
    Ok(trimmed.to_string())
}

impl Address {
    /// A world-level address.
    pub fn world(world: &str) -> Result<Self, AddressError> {
        Ok(Self {
            world: checked(world, "world")?,
            sector: None,
            arena: None,
            object: None,
        })
    }

    /// Builds an address from its components, checking the nesting rule.
    pub fn from_components(components: &[&str]) -> Result<Self, AddressError> {
        let mut iter = components.iter();
        let first = iter.next().ok_or(AddressError::Empty)?;
        let mut address = Self::world(first)?;
        for name in iter {
            address = address.child(name)?;
        }
        Ok(address)
    }

    /// Descends one level.
    pub fn child(&self, name: &str) -> Result<Self, AddressError> {
        let mut next = self.clone();
        match self.level() {
            AddressLevel::World => next.sector = Some(checked(name, "sector")?),
            AddressLevel::Sector => next.arena = Some(checked(name, "arena")?),
            AddressLevel::Arena => next.object = Some(checked(name, "object")?),
            AddressLevel::Object => return Err(AddressError::BelowObject),
        }
        Ok(next)
    }

    pub fn world_name(&self) -> &str {
        &self.world
    }

    pub fn sector(&self) -> Option<&str> {
        self.sector.as_deref()
    }

    pub fn arena(&self) -> Option<&str> {
        self.arena.as_deref()
    }

    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    pub fn level(&self) -> AddressLevel {
        if self.object.is_some() {
            AddressLevel::Object
        } else if self.arena.is_some() {
            AddressLevel::Arena
        } else if self.sector.is_some() {
            AddressLevel::Sector
        } else {
            AddressLevel::World
        }
    }

    /// The most specific component name.
    pub fn leaf(&self) -> &str {
        self.object
            .as_deref()
            .or(self.arena.as_deref())
            .or(self.sector.as_deref())
            .unwrap_or(&self.world)
    }

    /// Cuts the address down to at most `level`.
    pub fn truncate(&self, level: AddressLevel) -> Self {
        let mut cut = self.clone();
        if level < AddressLevel::Object {
            cut.object = None;
        }
        if level < AddressLevel::Arena {
            cut.arena = None;
        }
        if level < AddressLevel::Sector {
            cut.sector = None;
        }
        cut
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &Address) -> bool {
        self.level() <= other.level() && other.truncate(self.level()) == *self
    }

    /// True when every given component matches; `None` matches anything.
    pub fn matches(&self, sector: Option<&str>, arena: Option<&str>, object: Option<&str>) -> bool {
        fn eq(want: Option<&str>, have: Option<&str>) -> bool {
            want.map_or(true, |w| have == Some(w))
        }
        eq(sector, self.sector()) && eq(arena, self.arena()) && eq(object, self.object())
    }

    pub fn components(&self) -> Vec<&str> {
        let mut parts = vec![self.world.as_str()];
        parts.extend(self.sector.as_deref());
        parts.extend(self.arena.as_deref());
        parts.extend(self.object.as_deref());
        parts
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components().join(":"))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Parses "world:sector:arena:object", any suffix of components optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(AddressError::Empty);
        }
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 4 {
            return Err(AddressError::TooDeep(parts.len()));
        }
        Self::from_components(&parts)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: Address = "the Ville:Hobbs Cafe:cafe:counter".parse().unwrap();
        assert_eq!(addr.world_name(), "the Ville");
        assert_eq!(addr.sector(), Some("Hobbs Cafe"));
        assert_eq!(addr.arena(), Some("cafe"));
        assert_eq!(addr.object(), Some("counter"));
        assert_eq!(addr.level(), AddressLevel::Object);
        assert_eq!(addr.leaf(), "counter");
        assert_eq!(addr.to_string(), "the Ville:Hobbs Cafe:cafe:counter");
    }

    #[test]
    fn test_rejects_blank_and_deep() {
        assert_eq!("".parse::<Address>(), Err(AddressError::Empty));
        assert_eq!(
            "w::arena".parse::<Address>(),
            Err(AddressError::BlankComponent("sector"))
        );
        assert_eq!("a:b:c:d:e".parse::<Address>(), Err(AddressError::TooDeep(5)));
    }

    #[test]
    fn test_child_stops_at_object() {
        let obj = Address::from_components(&["w", "s", "a", "o"]).unwrap();
        assert_eq!(obj.child("deeper"), Err(AddressError::BelowObject));
    }

    #[test]
    fn test_truncate_and_contains() {
        let obj: Address = "w:s:a:o".parse().unwrap();
        let arena = obj.truncate(AddressLevel::Arena);
        assert_eq!(arena.to_string(), "w:s:a");
        assert!(arena.contains(&obj));
        assert!(!obj.contains(&arena));
        assert_eq!(obj.truncate(AddressLevel::World).to_string(), "w");
    }

    #[test]
    fn test_matches_partial() {
        let obj: Address = "w:s:a:o".parse().unwrap();
        assert!(obj.matches(Some("s"), None, None));
        assert!(obj.matches(Some("s"), Some("a"), Some("o")));
        assert!(!obj.matches(None, Some("b"), None));
    }

    #[test]
    fn test_serde_as_string() {
        let addr: Address = "w:s".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"w:s\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<Address>("\"\"").is_err());
    }
}
