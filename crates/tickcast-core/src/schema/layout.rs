//! Struct-internal layout constants for the supported game build.
//!
//! Anchor addresses (where the tables themselves live) come from
//! [`LayoutSchema`](super::LayoutSchema); the constants here are offsets and
//! strides inside the structures those anchors point at, which do not vary
//! between runs of the same build.

/// Datum array header, shared by the player and object header tables.
pub mod datum_array {
    pub const MAX_COUNT: u64 = 0x20;
    pub const ELEMENT_SIZE: u64 = 0x22;
    pub const COUNT: u64 = 0x2E;
    pub const FIRST_ELEMENT: u64 = 0x34;
}

/// Object header table entries (index -> live object address).
pub mod object_header {
    pub const STRIDE: u64 = 12;
    pub const OBJECT_ADDRESS: u64 = 8;
}

/// Game time globals block.
pub mod game_time {
    pub const INITIALIZED: u64 = 0;
    pub const ACTIVE: u64 = 1;
    pub const PAUSED: u64 = 2;
    /// Incremented after the engine finishes a tick; the tick whose state is
    /// currently in memory is this value minus one.
    pub const TICK: u64 = 12;
    pub const SPEED: u64 = 24;
}

/// Static player records (one per connected player, stable for a game).
pub mod player {
    pub const LOCAL_INDEX: u64 = 0x2;
    pub const NAME: u64 = 0x4;
    /// UTF-16, 11 characters plus terminator.
    pub const NAME_LEN: usize = 24;
    pub const TEAM: u64 = 0x20;
    pub const RESPAWN_TIMER: u64 = 0x2C;
    /// Object handle, -1 while dead.
    pub const OBJECT_REF: u64 = 0x34;
    pub const PREVIOUS_OBJECT_REF: u64 = 0x38;
    pub const CAMO_TIMER: u64 = 0x68;
    pub const LAST_DEATH_TIME: u64 = 0x84;
    pub const KILL_STREAK: u64 = 0x92;
    pub const MULTIKILL: u64 = 0x94;
    pub const KILLS: u64 = 0x98;
    pub const ASSISTS: u64 = 0xA0;
    pub const TEAM_KILLS: u64 = 0xA8;
    pub const DEATHS: u64 = 0xAA;
    pub const SUICIDES: u64 = 0xAC;
    pub const SHOTS_FIRED: u64 = 0xAE;
    pub const SHOTS_HIT: u64 = 0xB2;
    /// CTF keeps per-player score here instead of in the score tables.
    pub const CTF_SCORE: u64 = 0xC4;
}

/// Live unit object backing a spawned player.
pub mod unit {
    pub const POSITION: u64 = 0xC;
    pub const VELOCITY: u64 = 0x18;
    pub const MAX_HEALTH: u64 = 0x88;
    pub const MAX_SHIELDS: u64 = 0x8C;
    pub const HEALTH: u64 = 0x90;
    pub const SHIELDS: u64 = 0x94;
    /// 0x10 while an overshield is charging.
    pub const SHIELD_STATUS: u64 = 0xB6;
    /// 0x51 camouflaged, 0x41 visible.
    pub const CAMO_FLAG: u64 = 0x1B4;
    pub const SELECTED_WEAPON: u64 = 0x2A2;
    pub const WEAPON_HANDLES: u64 = 0x2A8;
    pub const WEAPON_SLOTS: usize = 4;
    pub const PRIMARY_GRENADES: u64 = 0x2CE;
    pub const SECONDARY_GRENADES: u64 = 0x2CF;
    pub const ZOOM: u64 = 0x2D0;
    pub const CAMO_AMOUNT: u64 = 0x32C;
    pub const DAMAGE_TABLE: u64 = 0x3E0;
    pub const DAMAGE_ENTRIES: usize = 4;
    pub const DAMAGE_STRIDE: u64 = 16;
    pub const AIRBORNE: u64 = 0x424;
}

/// Entries in a unit's recent-damager ring.
pub mod damage_entry {
    /// 0xFFFFFFFF marks an empty slot.
    pub const TIME: u64 = 0;
    pub const AMOUNT: u64 = 4;
    pub const DEALER_DYNAMIC: u64 = 8;
    pub const DEALER_STATIC: u64 = 12;
}

/// Weapon objects.
pub mod weapon {
    pub const HEAT: u64 = 0xD4;
    pub const CHARGE: u64 = 0xF0;
    pub const RELOADING: u64 = 0x258;
    pub const RELOAD_TIME: u64 = 0x25A;
    pub const BACKPACK_AMMO: u64 = 0x25E;
    pub const MAGAZINE_AMMO: u64 = 0x260;
    /// Offset of the weapon-type byte inside the weapon's tag data.
    pub const TAG_TYPE: u64 = 0x309;
    /// Weapon-type bit set for charge-based (energy) weapons.
    pub const ENERGY_BIT: u8 = 8;
}

/// Generic live objects.
pub mod object {
    pub const TAG: u64 = 0x0;
    pub const FLAGS: u64 = 0x4;
    pub const POSITION: u64 = 0xC;
    pub const VELOCITY: u64 = 0x18;
    pub const TYPE: u64 = 0x64;
    pub const OWNER_UNIT: u64 = 0x70;
    pub const PARENT: u64 = 0xCC;
}

/// Projectile detail record, appended after the base object at the item
/// datum size.
pub mod projectile {
    pub const FLAGS: u64 = 0x0;
    pub const DETONATION_TIMER: u64 = 0x14;
    pub const ARMING_TIME: u64 = 0x1C;
    pub const TARGET_OBJECT: u64 = 0x1C;
    pub const DISTANCE_TRAVELED: u64 = 0x24;
}

/// Tag instance table (32-byte entries indexed by tag id).
pub mod tag {
    pub const STRIDE: u64 = 32;
    /// Pointer to the tag's path string.
    pub const NAME_PTR: u64 = 0x10;
    /// Pointer to the tag's data block.
    pub const DATA_PTR: u64 = 0x14;
    /// Bound for tag path strings.
    pub const NAME_MAX: usize = 128;
}

/// Scenario tag block: netgame spawn and item placement tables.
pub mod scenario {
    pub const SPAWN_COUNT: u64 = 852;
    pub const FIRST_SPAWN: u64 = 856;
    pub const SPAWN_STRIDE: u64 = 52;

    pub const ITEM_COUNT: u64 = 900;
    pub const FIRST_ITEM: u64 = 904;
    pub const ITEM_STRIDE: u64 = 144;
}

/// Netgame spawn point records.
pub mod spawn {
    pub const POSITION: u64 = 0;
    pub const FACING: u64 = 12;
    pub const TEAM: u64 = 16;
    pub const GAMETYPES: u64 = 20;
    pub const GAMETYPE_SLOTS: usize = 4;
}

/// Netgame item placement records.
pub mod item {
    pub const GAMETYPE: u64 = 0x4;
    pub const POSITION: u64 = 0x40;
    pub const TAG_REF: u64 = 0x5C;
    /// Respawn interval lives in the item's tag data.
    pub const TAG_SPAWN_INTERVAL: u64 = 0xC;
}
