use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::game::{GrenadeKind, Vec3};

/// Something that happened between two consecutive ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub tick: u32,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    GameStarted {
        map: String,
    },
    GameEnded {
        map: String,
    },
    Kill {
        player: usize,
        name: String,
        total: i16,
    },
    Death {
        player: usize,
        name: String,
        total: i16,
    },
    Assist {
        player: usize,
        name: String,
        total: i16,
    },
    Damage {
        dealer: usize,
        receiver: usize,
        amount: f32,
    },
    GrenadeThrown {
        player: usize,
        name: String,
        kind: GrenadeKind,
    },
    CamoAcquired {
        player: usize,
        name: String,
    },
    CamoLost {
        player: usize,
        name: String,
    },
    OvershieldAcquired {
        player: usize,
        name: String,
    },
    OvershieldLost {
        player: usize,
        name: String,
    },
    PlayerSpawned {
        player: usize,
        name: String,
        /// Spawn-point index, or `None` when no known spawn matched.
        spawn: Option<u16>,
        position: Vec3,
    },
}

impl Event {
    pub fn new(tick: u32, kind: EventKind) -> Self {
        Self { tick, kind }
    }

    pub fn kind_name(&self) -> &'static str {
        (&self.kind).into()
    }
}
