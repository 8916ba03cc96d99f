use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cross-tick aggregates for one player. Lives for a game; reset when a new
/// one starts. Mutated only through the extractor's returned copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMeta {
    pub shots_by_weapon: BTreeMap<String, u32>,
    pub shots_by_tick: BTreeMap<u32, u32>,
    pub kills_by_tick: BTreeMap<u32, u32>,
    pub deaths_by_tick: BTreeMap<u32, u32>,
    pub assists_by_tick: BTreeMap<u32, u32>,
    pub damage_dealt_by_tick: BTreeMap<u32, f32>,
    pub damage_received_by_tick: BTreeMap<u32, f32>,
    pub damage_to_player: BTreeMap<usize, f32>,
    pub damage_from_player: BTreeMap<usize, f32>,
    pub damage_dealt: f32,
    pub damage_received: f32,
    pub camo_by_tick: BTreeMap<u32, u32>,
    pub camo_count: u32,
    pub overshield_by_tick: BTreeMap<u32, u32>,
    pub overshield_count: u32,
}

impl PlayerMeta {
    pub fn total_shots(&self) -> u32 {
        self.shots_by_tick.values().sum()
    }

    pub fn total_kills(&self) -> u32 {
        self.kills_by_tick.values().sum()
    }
}

/// Aggregates for the game in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMeta {
    pub started_at: Option<DateTime<Utc>>,
    pub players: BTreeMap<usize, PlayerMeta>,
}

impl GameMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh zeroed aggregates for `count` players.
    pub fn reset(&mut self, count: usize) {
        self.players = (0..count).map(|i| (i, PlayerMeta::default())).collect();
    }

    pub fn player_mut(&mut self, index: usize) -> &mut PlayerMeta {
        self.players.entry(index).or_default()
    }
}
