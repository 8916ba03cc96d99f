use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::enums::GameType;
use crate::game::object::{ItemState, ObjectState, SpawnPoint};
use crate::game::player::PlayerState;

/// Dealer index -> receiver index -> latest ring amount.
///
/// Rebuilt every tick from the players' damage rings; the extractor diffs
/// consecutive matrices for damage events.
pub type DamageMatrix = BTreeMap<usize, BTreeMap<usize, f32>>;

/// Cost counters for producing one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickStats {
    pub sample_ms: u64,
    pub live_reads: u64,
    pub translator_resolved: usize,
}

/// Fully decoded world state at one tick.
///
/// Immutable once built; the extractor and every downstream consumer see the
/// same data. Superseded, never mutated, by the next tick's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u32,
    pub captured_at: DateTime<Utc>,
    pub map_name: String,
    pub variant: u8,
    pub game_type: GameType,
    pub engine_running: bool,
    pub can_score: bool,
    pub team_game: bool,
    pub paused: bool,
    pub team_scores: Vec<i32>,
    pub players: Vec<PlayerState>,
    pub objects: Vec<ObjectState>,
    pub items: Vec<ItemState>,
    pub spawns: Vec<SpawnPoint>,
    pub damage_counts: DamageMatrix,
}

impl Snapshot {
    /// An empty pre-game snapshot, the diff baseline before the first
    /// sampled tick.
    pub fn empty() -> Self {
        Self {
            tick: 0,
            captured_at: Utc::now(),
            map_name: String::new(),
            variant: 0,
            game_type: GameType::None,
            engine_running: false,
            can_score: false,
            team_game: false,
            paused: false,
            team_scores: Vec::new(),
            players: Vec::new(),
            objects: Vec::new(),
            items: Vec::new(),
            spawns: Vec::new(),
            damage_counts: DamageMatrix::new(),
        }
    }

    pub fn damage_for(&self, dealer: usize, receiver: usize) -> Option<f32> {
        self.damage_counts.get(&dealer)?.get(&receiver).copied()
    }
}
