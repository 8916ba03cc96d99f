//! Decoded game-state model: snapshots and the entities inside them.

mod enums;
mod object;
mod player;
mod snapshot;
mod vec3;

pub use enums::{GameType, GrenadeKind, ObjectType, gametype_code};
pub use object::{ItemState, ObjectDetail, ObjectState, SpawnPoint};
pub use player::{DamageEntry, PlayerDynamic, PlayerState, WeaponState};
pub use snapshot::{DamageMatrix, Snapshot, TickStats};
pub use vec3::Vec3;
