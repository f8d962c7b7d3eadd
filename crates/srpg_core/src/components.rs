//! Shared identity and classification types.
//!
//! These are small value types referenced by every other module: the
//! identifiers of units, items and skills, team allegiance, grid positions
//! and the role a unit plays in one strike.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! nid_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(nid: impl Into<String>) -> Self {
                Self(nid.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

nid_type!(
    /// Stable unique identifier of a unit.
    UnitId
);
nid_type!(
    /// Stable unique identifier of an item.
    ItemId
);
nid_type!(
    /// Stable unique identifier of a skill.
    SkillId
);

// ============================================================================
// Teams
// ============================================================================

/// Allegiance of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Team {
    /// Player-controlled units.
    #[default]
    Player,
    /// Allied NPCs fighting alongside the player.
    Other,
    /// Primary hostile army.
    Enemy,
    /// Third-party army hostile to everyone.
    Enemy2,
}

impl Team {
    /// Whether this team is controlled by the player.
    #[must_use]
    pub const fn is_player(self) -> bool {
        matches!(self, Self::Player)
    }

    /// Whether two teams fight on the same side.
    #[must_use]
    pub const fn is_allied_with(self, other: Self) -> bool {
        match (self, other) {
            (Self::Player | Self::Other, Self::Player | Self::Other) => true,
            (Self::Enemy, Self::Enemy) | (Self::Enemy2, Self::Enemy2) => true,
            _ => false,
        }
    }

    /// Whether two teams are hostile to each other.
    #[must_use]
    pub const fn is_enemy_of(self, other: Self) -> bool {
        !self.is_allied_with(other)
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Grid coordinate on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another tile.
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

// ============================================================================
// Combat roles
// ============================================================================

/// Role of the acting unit in one strike, passed to every modifier hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatMode {
    /// The initiating unit striking.
    Attack,
    /// The defending unit striking back.
    Defense,
    /// The initiating unit hitting an incidental area target.
    Splash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_alliances() {
        assert!(Team::Player.is_allied_with(Team::Other));
        assert!(Team::Enemy.is_enemy_of(Team::Player));
        assert!(Team::Enemy.is_enemy_of(Team::Enemy2));
        assert!(!Team::Enemy2.is_enemy_of(Team::Enemy2));
    }

    #[test]
    fn test_position_distance() {
        let a = Position::new(1, 1);
        assert_eq!(a.distance(Position::new(3, 2)), 3);
        assert_eq!(a.distance(a), 0);
        assert_eq!(Position::new(-1, 0).distance(Position::new(1, 0)), 2);
    }

    #[test]
    fn test_nid_display_and_order() {
        let a = UnitId::from("alm");
        let b = UnitId::new("celica");
        assert!(a < b);
        assert_eq!(a.to_string(), "alm");
        assert_eq!(b.as_str(), "celica");
    }
}
