use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, FromRepr, IntoStaticStr};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    FromRepr,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[repr(u8)]
pub enum GameType {
    None = 0,
    Ctf = 1,
    Slayer = 2,
    Oddball = 3,
    King = 4,
    Race = 5,
    Terminator = 6,
    Stub = 7,
}

/// Wildcard game-type codes used by netgame spawn points and item
/// placements.
pub mod gametype_code {
    pub const ALL: u8 = 12;
    pub const ALL_EXCEPT_CTF: u8 = 13;
    pub const ALL_EXCEPT_CTF_RACE: u8 = 14;
}

impl GameType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::from_repr(value)
    }

    /// Whether a spawn/item game-type code admits this game type.
    pub fn matches_code(&self, code: u8) -> bool {
        code == *self as u8
            || code == gametype_code::ALL
            || (code == gametype_code::ALL_EXCEPT_CTF && *self != Self::Ctf)
            || (code == gametype_code::ALL_EXCEPT_CTF_RACE
                && !matches!(self, Self::Ctf | Self::Race))
    }

    /// Whether any of a record's game-type code slots admit this game type.
    pub fn matches_any(&self, codes: &[u8]) -> bool {
        codes.iter().any(|&code| self.matches_code(code))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    FromRepr,
    IntoStaticStr,
    Display,
)]
#[repr(u8)]
pub enum ObjectType {
    Biped = 0,
    Vehicle = 1,
    Weapon = 2,
    Equipment = 3,
    Garbage = 4,
    Projectile = 5,
    Scenery = 6,
    Machine = 7,
    Control = 8,
    LightFixture = 9,
    Placeholder = 10,
    SoundScenery = 11,
}

impl ObjectType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::from_repr(value)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, Display,
)]
pub enum GrenadeKind {
    Frag,
    Plasma,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_type_from_repr() {
        assert_eq!(GameType::from_u8(1), Some(GameType::Ctf));
        assert_eq!(GameType::from_u8(5), Some(GameType::Race));
        assert_eq!(GameType::from_u8(42), None);
    }

    #[test]
    fn test_exact_code_match() {
        assert!(GameType::Ctf.matches_code(1));
        assert!(!GameType::Ctf.matches_code(2));
    }

    #[test]
    fn test_wildcard_codes() {
        assert!(GameType::Ctf.matches_code(gametype_code::ALL));
        assert!(GameType::Race.matches_code(gametype_code::ALL));

        assert!(!GameType::Ctf.matches_code(gametype_code::ALL_EXCEPT_CTF));
        assert!(GameType::Race.matches_code(gametype_code::ALL_EXCEPT_CTF));

        assert!(!GameType::Ctf.matches_code(gametype_code::ALL_EXCEPT_CTF_RACE));
        assert!(!GameType::Race.matches_code(gametype_code::ALL_EXCEPT_CTF_RACE));
        assert!(GameType::Slayer.matches_code(gametype_code::ALL_EXCEPT_CTF_RACE));
    }

    #[test]
    fn test_matches_any_slots() {
        assert!(GameType::Slayer.matches_any(&[0, 0, 2, 0]));
        assert!(!GameType::Slayer.matches_any(&[1, 3, 4, 5]));
    }

    #[test]
    fn test_object_type_from_repr() {
        assert_eq!(ObjectType::from_u8(5), Some(ObjectType::Projectile));
        assert_eq!(ObjectType::from_u8(200), None);
    }
}
