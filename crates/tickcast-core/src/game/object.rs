use serde::{Deserialize, Serialize};

use crate::game::enums::ObjectType;
use crate::game::vec3::Vec3;

/// Detail record present only for some object types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectDetail {
    None,
    Projectile {
        flags: u32,
        detonation_timer: f32,
        arming_time: f32,
        distance_traveled: f32,
        target_ref: i32,
    },
}

/// One live entry from the object header table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Object table index; handles referencing this object carry it in
    /// their low 16 bits.
    pub object_id: u16,
    pub tag_name: String,
    pub object_type: Option<ObjectType>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub flags: u32,
    pub owner_unit_ref: u32,
    pub parent_ref: u32,
    pub detail: ObjectDetail,
}

impl ObjectState {
    pub fn is_projectile(&self) -> bool {
        matches!(self.detail, ObjectDetail::Projectile { .. })
    }
}

/// A netgame item placement from the scenario (powerups, weapons on map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemState {
    pub tag_id: u16,
    pub tag_name: String,
    pub gametype_code: u8,
    pub position: Vec3,
    /// Seconds between respawns, from the item's tag.
    pub spawn_interval: i16,
}

/// A netgame spawn point from the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub index: u16,
    pub position: Vec3,
    pub facing: f32,
    pub team: u8,
    /// Four game-type code slots; see [`GameType::matches_any`].
    ///
    /// [`GameType::matches_any`]: crate::game::GameType::matches_any
    pub gametypes: [u8; 4],
}
