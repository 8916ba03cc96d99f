use serde::{Deserialize, Serialize};

use crate::game::vec3::Vec3;

/// One entry in a unit's recent-damager ring (4 slots, newest wins).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageEntry {
    /// Game tick the damage landed on.
    pub time: u32,
    pub amount: f32,
    /// Object handle of the dealer's unit at the time.
    pub dealer_object: u32,
    /// Static player handle of the dealer; low 16 bits index the player table.
    pub dealer_player: u32,
}

impl DamageEntry {
    pub fn dealer_index(&self) -> usize {
        (self.dealer_player & 0xFFFF) as usize
    }
}

/// A weapon held in one of a unit's four slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponState {
    /// Object table index; stable for the weapon's lifetime, the identity
    /// used to match slots across ticks.
    pub object_id: u16,
    pub tag_name: String,
    pub is_energy: bool,
    pub magazine_ammo: i16,
    pub backpack_ammo: i16,
    /// Stored charge for energy weapons; continuous, decreases on fire.
    pub charge: f32,
    pub heat: f32,
    pub reloading: bool,
    pub reload_time: i16,
}

/// State present only while the player's in-world unit exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDynamic {
    pub position: Vec3,
    pub velocity: Vec3,
    pub health: f32,
    pub shields: f32,
    pub max_health: f32,
    pub max_shields: f32,
    /// Raw camo byte: 0x51 camouflaged, 0x41 visible.
    pub camo_flag: u8,
    pub camo_amount: f32,
    /// 0x10 while an overshield is charging.
    pub shield_status: u16,
    pub primary_grenades: u8,
    pub secondary_grenades: u8,
    pub zoom_level: i8,
    pub airborne: bool,
    pub selected_weapon: i16,
    pub weapons: Vec<WeaponState>,
}

impl PlayerDynamic {
    pub fn has_camo(&self) -> bool {
        self.camo_flag == 0x51
    }

    /// Overshield is visible either as the charging status word or as a
    /// shield level above the normal maximum.
    pub fn has_overshield(&self) -> bool {
        self.shield_status == 0x10 || self.shields > 1.0
    }

    pub fn weapon_by_object_id(&self, object_id: u16) -> Option<&WeaponState> {
        self.weapons.iter().find(|w| w.object_id == object_id)
    }
}

/// One player's full state at a tick: the static record that survives death
/// plus the live unit while spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub index: usize,
    /// Local controller slot, -1 for remote players.
    pub local_index: i16,
    pub name: String,
    pub team: u32,
    pub score: i32,
    pub kills: i16,
    pub assists: i16,
    pub deaths: i16,
    pub team_kills: i16,
    pub suicides: i16,
    pub kill_streak: u16,
    pub multikill: u16,
    pub shots_fired: i32,
    pub shots_hit: i16,
    pub respawn_timer: u32,
    /// Tick of the most recent death.
    pub last_death_time: u32,
    /// Object handle of the live unit; -1 while dead.
    pub object_ref: i32,
    pub previous_object_ref: i32,
    /// Recent damagers, read from the live unit (or the previous one on the
    /// death tick).
    pub damage_table: Vec<DamageEntry>,
    pub dynamic: Option<PlayerDynamic>,
}

impl PlayerState {
    pub fn is_alive(&self) -> bool {
        self.object_ref != -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic() -> PlayerDynamic {
        PlayerDynamic {
            position: Vec3::default(),
            velocity: Vec3::default(),
            health: 1.0,
            shields: 1.0,
            max_health: 1.0,
            max_shields: 1.0,
            camo_flag: 0x41,
            camo_amount: 0.0,
            shield_status: 0,
            primary_grenades: 2,
            secondary_grenades: 0,
            zoom_level: -1,
            airborne: false,
            selected_weapon: 0,
            weapons: Vec::new(),
        }
    }

    #[test]
    fn test_camo_predicate() {
        let mut d = dynamic();
        assert!(!d.has_camo());
        d.camo_flag = 0x51;
        assert!(d.has_camo());
    }

    #[test]
    fn test_overshield_predicate() {
        let mut d = dynamic();
        assert!(!d.has_overshield());

        // Charging status word.
        d.shield_status = 0x10;
        assert!(d.has_overshield());

        // Fully charged: status clears but shields exceed normal max.
        d.shield_status = 0;
        d.shields = 2.9;
        assert!(d.has_overshield());
    }

    #[test]
    fn test_dealer_index_masks_salt() {
        let entry = DamageEntry {
            time: 100,
            amount: 25.0,
            dealer_object: 0xE5E0_001C,
            dealer_player: 0xC96E_0003,
        };
        assert_eq!(entry.dealer_index(), 3);
    }
}
