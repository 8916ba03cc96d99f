use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::game::GameType;

/// Guest addresses of the per-game-type score tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamScoreTable {
    pub ctf: u64,
    pub slayer: u64,
    pub oddball: u64,
    pub king: u64,
    pub race: u64,
}

impl Default for TeamScoreTable {
    fn default() -> Self {
        Self {
            ctf: 0x2762B4,
            slayer: 0x276710,
            oddball: 0x27653C,
            king: 0x2762D8,
            race: 0x2766C8,
        }
    }
}

impl TeamScoreTable {
    pub fn team_score_addr(&self, game_type: GameType) -> Option<u64> {
        match game_type {
            GameType::Ctf => Some(self.ctf),
            GameType::Slayer => Some(self.slayer),
            GameType::Oddball => Some(self.oddball),
            GameType::King => Some(self.king),
            GameType::Race => Some(self.race),
            _ => None,
        }
    }

    /// Player score arrays sit 16 slots after the team scores. CTF is the
    /// exception; its per-player score lives inside the static player record.
    pub fn player_score_addr(&self, game_type: GameType) -> Option<u64> {
        match game_type {
            GameType::Ctf => None,
            other => self.team_score_addr(other).map(|addr| addr + 64),
        }
    }
}

/// Anchor addresses for one game build: where the engine's tables and
/// globals live in guest memory.
///
/// The engine itself never hardcodes a guest address; everything it touches
/// starts from one of these anchors plus the offsets in
/// [`layout`](super::layout). A different build ships as a JSON file loaded
/// over the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSchema {
    /// Pointer to the game-time globals block.
    pub game_time_globals_ptr: u64,
    /// Pointer to the static player datum array.
    pub player_datum_array_ptr: u64,
    /// Pointer to the object header datum array.
    pub object_header_array_ptr: u64,
    /// Pointer to the loaded scenario tag data.
    pub scenario_ptr: u64,
    /// Base of the tag instance table.
    pub tag_instances_ptr: u64,
    /// Pointer to game-engine globals; nonzero while an engine is running,
    /// game type u32 at +4.
    pub game_engine_globals_ptr: u64,
    /// Zero while scoring is live.
    pub score_frozen_flag: u64,
    pub map_name: u64,
    pub variant: u64,
    pub team_game_flag: u64,
    pub main_menu_active: u64,
    /// Pointer to the game state allocation region.
    pub game_state_region_ptr: u64,
    /// Size of that region.
    pub game_state_region_size: u64,
    /// Per-type datum sizes; the projectile detail record starts this many
    /// bytes into a projectile object.
    pub item_datum_size: u64,
    pub team_scores: TeamScoreTable,
    /// Bound for the map name string.
    pub map_name_max: usize,
}

impl Default for LayoutSchema {
    fn default() -> Self {
        Self {
            game_time_globals_ptr: 0x2F8CA0,
            player_datum_array_ptr: 0x2FAD28,
            object_header_array_ptr: 0x2FC6AC,
            scenario_ptr: 0x39BE5C,
            tag_instances_ptr: 0x39CE24,
            game_engine_globals_ptr: 0x2F9110,
            score_frozen_flag: 0x2FABF0,
            map_name: 0x2E37CD,
            variant: 0x2F90F4,
            team_game_flag: 0x2F90C4,
            main_menu_active: 0x2E4068,
            game_state_region_ptr: 0x2E2D14,
            game_state_region_size: 0x32E4A,
            item_datum_size: 0x1FC380,
            team_scores: TeamScoreTable::default(),
            map_name_max: 32,
        }
    }
}

impl LayoutSchema {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let schema: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::InvalidSchema(format!("{}: {}", path.display(), e)))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let anchors = [
            ("game_time_globals_ptr", self.game_time_globals_ptr),
            ("player_datum_array_ptr", self.player_datum_array_ptr),
            ("object_header_array_ptr", self.object_header_array_ptr),
            ("scenario_ptr", self.scenario_ptr),
            ("tag_instances_ptr", self.tag_instances_ptr),
            ("game_engine_globals_ptr", self.game_engine_globals_ptr),
        ];
        for (name, addr) in anchors {
            if addr == 0 {
                return Err(Error::InvalidSchema(format!("{} must be nonzero", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(LayoutSchema::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let schema: LayoutSchema =
            serde_json::from_str(r#"{"scenario_ptr": 1234}"#).unwrap();
        assert_eq!(schema.scenario_ptr, 1234);
        assert_eq!(
            schema.player_datum_array_ptr,
            LayoutSchema::default().player_datum_array_ptr
        );
    }

    #[test]
    fn test_zero_anchor_rejected() {
        let schema: LayoutSchema =
            serde_json::from_str(r#"{"tag_instances_ptr": 0}"#).unwrap();
        assert!(matches!(
            schema.validate().unwrap_err(),
            Error::InvalidSchema(_)
        ));
    }

    #[test]
    fn test_load_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let mut schema = LayoutSchema::default();
        schema.map_name = 0x1234;
        schema.save(&path).unwrap();

        let loaded = LayoutSchema::load(&path).unwrap();
        assert_eq!(loaded.map_name, 0x1234);
    }

    #[test]
    fn test_score_addresses() {
        let table = TeamScoreTable::default();
        assert_eq!(table.team_score_addr(GameType::Slayer), Some(0x276710));
        assert_eq!(table.player_score_addr(GameType::Slayer), Some(0x276750));
        assert_eq!(table.player_score_addr(GameType::Ctf), None);
        assert_eq!(table.team_score_addr(GameType::None), None);
    }
}
