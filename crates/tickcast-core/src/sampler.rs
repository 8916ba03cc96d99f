//! Schema-driven snapshot production.
//!
//! One [`GameStateSampler::sample`] call walks every table the schema
//! describes through a [`MemorySession`] and returns a fully decoded
//! [`Snapshot`]. Count-prefixed arrays decode element `i` at
//! `first + i * stride`; implausible counts decode to empty sequences, not
//! errors. Scenario tables (spawns, item placements) are fixed for a map and
//! cached between ticks.

use tracing::{debug, warn};

use crate::error::Result;
use crate::game::{
    DamageEntry, DamageMatrix, GameType, ItemState, ObjectDetail, ObjectState, ObjectType,
    PlayerDynamic, PlayerState, Snapshot, SpawnPoint, Vec3, WeaponState,
};
use crate::memory::{MemorySession, RawMemory};
use crate::qmp::Translate;
use crate::schema::{LayoutSchema, layout};

/// Sanity bound on count-prefixed arrays; a count beyond this means a stale
/// or garbage header and the table decodes as empty.
const MAX_TABLE_COUNT: u16 = 2048;

/// Header of a datum array (player table, object header table).
struct DatumHeader {
    count: u16,
    element_size: u16,
    first_element: u64,
}

pub struct GameStateSampler {
    schema: LayoutSchema,
    spawns: Vec<SpawnPoint>,
    items: Vec<ItemState>,
}

impl GameStateSampler {
    pub fn new(schema: LayoutSchema) -> Self {
        Self {
            schema,
            spawns: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn schema(&self) -> &LayoutSchema {
        &self.schema
    }

    /// Drop the per-map scenario caches. Called on game start, when a new
    /// map may be loaded.
    pub fn clear_scenario_cache(&mut self) {
        self.spawns.clear();
        self.items.clear();
    }

    /// The tick whose state is currently in memory. The counter increments
    /// after the engine finishes a tick, hence the minus one.
    pub fn current_tick<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
    ) -> Result<u32> {
        // The globals pointer only changes when the allocation moves; a
        // changed value is worth a forced re-translation.
        let globals = session
            .read_typed(
                self.schema.game_time_globals_ptr,
                crate::memory::decode::ValueKind::U32,
                crate::memory::ReadOptions::watched(),
            )?
            .as_u64()
            .unwrap_or(0);
        Ok(session
            .read_u32(globals + layout::game_time::TICK)?
            .wrapping_sub(1))
    }

    /// Snapshot the regions the per-field reads will walk. Skipping a region
    /// is a performance loss, not a fault, so failures only warn.
    pub fn populate_ranges<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
    ) -> Result<()> {
        let state_base = session.read_u32(self.schema.game_state_region_ptr)? as u64;
        let state_size = session.read_u32(self.schema.game_state_region_size)? as usize;
        if state_base != 0 && state_size > 0 {
            if let Err(e) = session.add_range(state_base, state_size) {
                warn!("Skipping game-state range snapshot: {}", e);
            }
        } else {
            debug!("Game state region not available, skipping range snapshot");
        }

        let scenario = session.read_u32(self.schema.scenario_ptr)? as u64;
        if scenario != 0 {
            let first_spawn = session.read_i32(scenario + layout::scenario::FIRST_SPAWN)?;
            let spawn_count = session.read_i32(scenario + layout::scenario::SPAWN_COUNT)?;
            if first_spawn > 0 && spawn_count > 0 {
                let len = layout::scenario::SPAWN_STRIDE as usize * spawn_count as usize;
                if let Err(e) = session.add_range(first_spawn as u64, len) {
                    warn!("Skipping spawn-table range snapshot: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Produce one snapshot. A `MemoryFault` anywhere aborts the whole
    /// sample; the caller retries on the next tick rather than publishing a
    /// partial world.
    pub fn sample<R: RawMemory, T: Translate>(
        &mut self,
        session: &mut MemorySession<R, T>,
    ) -> Result<Snapshot> {
        let globals = session.read_u32(self.schema.game_time_globals_ptr)? as u64;
        let tick = session
            .read_u32(globals + layout::game_time::TICK)?
            .wrapping_sub(1);
        let initialized = session.read_u8(globals + layout::game_time::INITIALIZED)? != 0;
        let active = session.read_u8(globals + layout::game_time::ACTIVE)? != 0;
        let paused = session.read_u8(globals + layout::game_time::PAUSED)? != 0;
        let main_menu = session.read_u8(self.schema.main_menu_active)? != 0;

        let engine_globals = session.read_u32(self.schema.game_engine_globals_ptr)? as u64;
        let engine_running = engine_globals != 0;
        let game_type = if engine_running {
            let raw = session.read_u32(engine_globals + 4)? as u8;
            GameType::from_u8(raw).unwrap_or(GameType::None)
        } else {
            GameType::None
        };
        let can_score = engine_running && session.read_u32(self.schema.score_frozen_flag)? == 0;
        let team_game = session.read_u8(self.schema.team_game_flag)? != 0;
        let variant = session.read_u8(self.schema.variant)?;
        let map_name = session.read_utf8(self.schema.map_name, self.schema.map_name_max)?;

        let in_game = initialized && active && !main_menu;

        let mut damage_counts = DamageMatrix::new();
        let players = if in_game {
            self.read_players(session, tick, game_type, &mut damage_counts)?
        } else {
            Vec::new()
        };
        let objects = if in_game {
            self.read_objects(session)?
        } else {
            Vec::new()
        };

        if engine_running {
            if self.spawns.is_empty() {
                self.spawns = self.read_spawns(session)?;
            }
            if self.items.is_empty() {
                self.items = self.read_items(session)?;
            }
        }

        let team_scores = if engine_running {
            self.read_team_scores(session, game_type)?
        } else {
            Vec::new()
        };

        Ok(Snapshot {
            tick,
            captured_at: chrono::Utc::now(),
            map_name,
            variant,
            game_type,
            engine_running,
            can_score,
            team_game,
            paused,
            team_scores,
            players,
            objects,
            items: self.items.clone(),
            spawns: self.spawns.clone(),
            damage_counts,
        })
    }

    fn read_datum_header<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        table: u64,
    ) -> Result<DatumHeader> {
        Ok(DatumHeader {
            count: session.read_u16(table + layout::datum_array::COUNT)?,
            element_size: session.read_u16(table + layout::datum_array::ELEMENT_SIZE)?,
            first_element: session.read_u32(table + layout::datum_array::FIRST_ELEMENT)? as u64,
        })
    }

    /// Live object address for an object handle; the low 16 bits index the
    /// header table. Zero when the slot is free.
    fn object_address<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        header_first: u64,
        handle: u32,
    ) -> Result<u64> {
        let index = (handle & 0xFFFF) as u64;
        let entry = header_first + index * layout::object_header::STRIDE;
        Ok(session.read_u32(entry + layout::object_header::OBJECT_ADDRESS)? as u64)
    }

    /// Address of one 32-byte tag instance entry. The table base is behind
    /// a pointer and stable for a map.
    fn tag_entry<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        tag_index: u16,
    ) -> Result<u64> {
        let base = session.read_u32(self.schema.tag_instances_ptr)? as u64;
        Ok(base + layout::tag::STRIDE * tag_index as u64)
    }

    fn tag_name<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        tag_index: u16,
    ) -> Result<String> {
        let entry = self.tag_entry(session, tag_index)?;
        let name_ptr = session.read_u32(entry + layout::tag::NAME_PTR)? as u64;
        if name_ptr == 0 {
            return Ok(String::new());
        }
        session.read_utf8(name_ptr, layout::tag::NAME_MAX)
    }

    fn read_players<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        tick: u32,
        game_type: GameType,
        damage_counts: &mut DamageMatrix,
    ) -> Result<Vec<PlayerState>> {
        let table = session.read_u32(self.schema.player_datum_array_ptr)? as u64;
        let header = self.read_datum_header(session, table)?;
        if header.count == 0 || header.count > MAX_TABLE_COUNT || header.first_element == 0 {
            return Ok(Vec::new());
        }

        let object_table = session.read_u32(self.schema.object_header_array_ptr)? as u64;
        let object_header = self.read_datum_header(session, object_table)?;

        let player_scores = self.schema.team_scores.player_score_addr(game_type);

        let mut players = Vec::with_capacity(header.count as usize);
        for index in 0..header.count as usize {
            let base = header.first_element + index as u64 * header.element_size as u64;
            let player = self.read_player(
                session,
                base,
                index,
                tick,
                game_type,
                player_scores,
                object_header.first_element,
                damage_counts,
            )?;
            players.push(player);
        }
        Ok(players)
    }

    #[allow(clippy::too_many_arguments)]
    fn read_player<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        base: u64,
        index: usize,
        tick: u32,
        game_type: GameType,
        player_scores: Option<u64>,
        object_header_first: u64,
        damage_counts: &mut DamageMatrix,
    ) -> Result<PlayerState> {
        use layout::player as p;

        let object_ref = session.read_i32(base + p::OBJECT_REF)?;
        let previous_object_ref = session.read_i32(base + p::PREVIOUS_OBJECT_REF)?;
        let last_death_time = session.read_u32(base + p::LAST_DEATH_TIME)?;
        let alive = object_ref != -1;

        let unit_address = if alive {
            self.object_address(session, object_header_first, object_ref as u32)?
        } else {
            0
        };

        // The unit is unassigned on the death tick itself; the previous
        // unit's ring still holds the killing damage.
        let ring_unit = if alive {
            unit_address
        } else {
            self.object_address(session, object_header_first, previous_object_ref as u32)?
        };
        let damage_table = if ring_unit != 0 {
            self.read_damage_ring(session, ring_unit + layout::unit::DAMAGE_TABLE)?
        } else {
            Vec::new()
        };
        // Include a dead player's incoming damage only on the death tick;
        // anything older belongs to a previous life.
        if alive || last_death_time == tick {
            for entry in &damage_table {
                damage_counts
                    .entry(entry.dealer_index())
                    .or_default()
                    .insert(index, entry.amount);
            }
        }

        let dynamic = if alive && unit_address != 0 {
            Some(self.read_dynamic(session, unit_address, object_header_first)?)
        } else {
            None
        };

        let score = match game_type {
            GameType::Ctf => session.read_i16(base + p::CTF_SCORE)? as i32,
            _ => match player_scores {
                Some(addr) => session.read_i32(addr + 4 * index as u64)?,
                None => 0,
            },
        };

        Ok(PlayerState {
            index,
            local_index: session.read_i16(base + p::LOCAL_INDEX)?,
            name: session.read_utf16(base + p::NAME, p::NAME_LEN)?,
            team: session.read_u32(base + p::TEAM)?,
            score,
            kills: session.read_i16(base + p::KILLS)?,
            assists: session.read_i16(base + p::ASSISTS)?,
            deaths: session.read_i16(base + p::DEATHS)?,
            team_kills: session.read_i16(base + p::TEAM_KILLS)?,
            suicides: session.read_i16(base + p::SUICIDES)?,
            kill_streak: session.read_u16(base + p::KILL_STREAK)?,
            multikill: session.read_u16(base + p::MULTIKILL)?,
            shots_fired: session.read_i32(base + p::SHOTS_FIRED)?,
            shots_hit: session.read_i16(base + p::SHOTS_HIT)?,
            respawn_timer: session.read_u32(base + p::RESPAWN_TIMER)?,
            last_death_time,
            object_ref,
            previous_object_ref,
            damage_table,
            dynamic,
        })
    }

    fn read_damage_ring<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        ring_base: u64,
    ) -> Result<Vec<DamageEntry>> {
        use layout::{damage_entry as d, unit};

        let mut entries = Vec::new();
        for slot in 0..unit::DAMAGE_ENTRIES {
            let base = ring_base + slot as u64 * unit::DAMAGE_STRIDE;
            let time = session.read_u32(base + d::TIME)?;
            if time == 0xFFFF_FFFF {
                continue;
            }
            entries.push(DamageEntry {
                time,
                amount: session.read_f32(base + d::AMOUNT)?,
                dealer_object: session.read_u32(base + d::DEALER_DYNAMIC)?,
                dealer_player: session.read_u32(base + d::DEALER_STATIC)?,
            });
        }
        Ok(entries)
    }

    fn read_dynamic<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        unit: u64,
        object_header_first: u64,
    ) -> Result<PlayerDynamic> {
        use layout::unit as u;

        let mut weapons = Vec::new();
        for slot in 0..u::WEAPON_SLOTS {
            let handle = session.read_u32(unit + u::WEAPON_HANDLES + 4 * slot as u64)?;
            if handle == 0xFFFF_FFFF {
                continue;
            }
            if let Some(weapon) = self.read_weapon(session, object_header_first, handle)? {
                weapons.push(weapon);
            }
        }

        Ok(PlayerDynamic {
            position: self.read_vec3(session, unit + u::POSITION)?,
            velocity: self.read_vec3(session, unit + u::VELOCITY)?,
            health: session.read_f32(unit + u::HEALTH)?,
            shields: session.read_f32(unit + u::SHIELDS)?,
            max_health: session.read_f32(unit + u::MAX_HEALTH)?,
            max_shields: session.read_f32(unit + u::MAX_SHIELDS)?,
            camo_flag: session.read_u8(unit + u::CAMO_FLAG)?,
            camo_amount: session.read_f32(unit + u::CAMO_AMOUNT)?,
            shield_status: session.read_u16(unit + u::SHIELD_STATUS)?,
            primary_grenades: session.read_u8(unit + u::PRIMARY_GRENADES)?,
            secondary_grenades: session.read_u8(unit + u::SECONDARY_GRENADES)?,
            zoom_level: session.read_i8(unit + u::ZOOM)?,
            airborne: session.read_u8(unit + u::AIRBORNE)? != 0,
            selected_weapon: session.read_i16(unit + u::SELECTED_WEAPON)?,
            weapons,
        })
    }

    fn read_weapon<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        object_header_first: u64,
        handle: u32,
    ) -> Result<Option<WeaponState>> {
        use layout::weapon as w;

        let address = self.object_address(session, object_header_first, handle)?;
        if address == 0 {
            return Ok(None);
        }
        let tag_index = session.read_i16(address + layout::object::TAG)? as u16;
        let tag_entry = self.tag_entry(session, tag_index)?;
        let tag_data = session.read_u32(tag_entry + layout::tag::DATA_PTR)? as u64;
        let weapon_type = if tag_data != 0 {
            session.read_u8(tag_data + w::TAG_TYPE)?
        } else {
            0
        };

        Ok(Some(WeaponState {
            object_id: (handle & 0xFFFF) as u16,
            tag_name: self.tag_name(session, tag_index)?,
            is_energy: weapon_type & w::ENERGY_BIT != 0,
            magazine_ammo: session.read_i16(address + w::MAGAZINE_AMMO)?,
            backpack_ammo: session.read_i16(address + w::BACKPACK_AMMO)?,
            charge: session.read_f32(address + w::CHARGE)?,
            heat: session.read_f32(address + w::HEAT)?,
            reloading: session.read_u8(address + w::RELOADING)? != 0,
            reload_time: session.read_i16(address + w::RELOAD_TIME)?,
        }))
    }

    fn read_objects<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
    ) -> Result<Vec<ObjectState>> {
        use layout::object as o;

        let table = session.read_u32(self.schema.object_header_array_ptr)? as u64;
        let header = self.read_datum_header(session, table)?;
        if header.count == 0 || header.count > MAX_TABLE_COUNT || header.first_element == 0 {
            return Ok(Vec::new());
        }

        let item_datum_size = session.read_u16(self.schema.item_datum_size)? as u64;

        let mut objects = Vec::new();
        for object_id in 0..header.count {
            let entry = header.first_element
                + object_id as u64 * layout::object_header::STRIDE;
            let address =
                session.read_u32(entry + layout::object_header::OBJECT_ADDRESS)? as u64;
            if address == 0 {
                continue;
            }

            let tag_index = session.read_i16(address + o::TAG)? as u16;
            let object_type = ObjectType::from_u8(session.read_u8(address + o::TYPE)?);

            let detail = if object_type == Some(ObjectType::Projectile) && item_datum_size != 0 {
                self.read_projectile_detail(session, address + item_datum_size)?
            } else {
                ObjectDetail::None
            };

            objects.push(ObjectState {
                object_id,
                tag_name: self.tag_name(session, tag_index)?,
                object_type,
                position: self.read_vec3(session, address + o::POSITION)?,
                velocity: self.read_vec3(session, address + o::VELOCITY)?,
                flags: session.read_u32(address + o::FLAGS)?,
                owner_unit_ref: session.read_u32(address + o::OWNER_UNIT)?,
                parent_ref: session.read_u32(address + o::PARENT)?,
                detail,
            });
        }
        Ok(objects)
    }

    fn read_projectile_detail<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        detail: u64,
    ) -> Result<ObjectDetail> {
        use layout::projectile as pr;

        Ok(ObjectDetail::Projectile {
            flags: session.read_u32(detail + pr::FLAGS)?,
            detonation_timer: session.read_f32(detail + pr::DETONATION_TIMER)?,
            arming_time: session.read_f32(detail + pr::ARMING_TIME)?,
            distance_traveled: session.read_f32(detail + pr::DISTANCE_TRAVELED)?,
            target_ref: session.read_i32(detail + pr::TARGET_OBJECT)?,
        })
    }

    fn read_spawns<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
    ) -> Result<Vec<SpawnPoint>> {
        use layout::{scenario, spawn};

        let scenario_base = session.read_u32(self.schema.scenario_ptr)? as u64;
        if scenario_base == 0 {
            return Ok(Vec::new());
        }
        let count = session.read_i32(scenario_base + scenario::SPAWN_COUNT)?;
        let first = session.read_u32(scenario_base + scenario::FIRST_SPAWN)? as u64;
        if count <= 0 || count > MAX_TABLE_COUNT as i32 || first == 0 {
            return Ok(Vec::new());
        }

        let mut spawns = Vec::with_capacity(count as usize);
        for index in 0..count as u16 {
            let base = first + index as u64 * scenario::SPAWN_STRIDE;
            let mut gametypes = [0u8; spawn::GAMETYPE_SLOTS];
            for (slot, code) in gametypes.iter_mut().enumerate() {
                *code = session.read_u8(base + spawn::GAMETYPES + slot as u64)?;
            }
            spawns.push(SpawnPoint {
                index,
                position: self.read_vec3(session, base + spawn::POSITION)?,
                facing: session.read_f32(base + spawn::FACING)?,
                team: session.read_u8(base + spawn::TEAM)?,
                gametypes,
            });
        }
        Ok(spawns)
    }

    fn read_items<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
    ) -> Result<Vec<ItemState>> {
        use layout::{item, scenario, tag};

        let scenario_base = session.read_u32(self.schema.scenario_ptr)? as u64;
        if scenario_base == 0 {
            return Ok(Vec::new());
        }
        let count = session.read_i32(scenario_base + scenario::ITEM_COUNT)?;
        let first = session.read_u32(scenario_base + scenario::FIRST_ITEM)? as u64;
        if count <= 0 || count > MAX_TABLE_COUNT as i32 || first == 0 {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for index in 0..count as u64 {
            let base = first + index * scenario::ITEM_STRIDE;
            let tag_ref = session.read_i32(base + item::TAG_REF)?;
            if tag_ref == -1 {
                continue;
            }
            let tag_id = (tag_ref & 0xFFFF) as u16;
            let tag_entry = self.tag_entry(session, tag_id)?;
            let tag_data = session.read_u32(tag_entry + tag::DATA_PTR)? as u64;
            let spawn_interval = if tag_data != 0 {
                session.read_i16(tag_data + item::TAG_SPAWN_INTERVAL)?
            } else {
                0
            };
            items.push(ItemState {
                tag_id,
                tag_name: self.tag_name(session, tag_id)?,
                gametype_code: session.read_u8(base + item::GAMETYPE)?,
                position: self.read_vec3(session, base + item::POSITION)?,
                spawn_interval,
            });
        }
        Ok(items)
    }

    fn read_team_scores<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        game_type: GameType,
    ) -> Result<Vec<i32>> {
        let Some(addr) = self.schema.team_scores.team_score_addr(game_type) else {
            return Ok(Vec::new());
        };
        Ok(vec![
            session.read_i32(addr)?,
            session.read_i32(addr + 4)?,
        ])
    }

    fn read_vec3<R: RawMemory, T: Translate>(
        &self,
        session: &mut MemorySession<R, T>,
        base: u64,
    ) -> Result<Vec3> {
        Ok(Vec3 {
            x: session.read_f32(base)?,
            y: session.read_f32(base + 4)?,
            z: session.read_f32(base + 8)?,
        })
    }

}
