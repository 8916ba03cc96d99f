//! Tick diffing: two snapshots in, ordered events and updated aggregates out.
//!
//! `extract` never mutates its inputs; it clones the incoming meta, applies
//! this tick's changes to the clone and hands it back. The caller decides
//! when to commit, so replaying the same snapshot pair yields the same
//! events.

use tracing::{debug, warn};

use crate::events::event::{Event, EventKind};
use crate::events::meta::GameMeta;
use crate::game::{GrenadeKind, PlayerState, Snapshot, SpawnPoint};

/// Result of diffing one pair of consecutive snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct TickDiff {
    pub events: Vec<Event>,
    /// Updated aggregates; the caller commits these after publishing.
    pub meta: GameMeta,
    /// A game started on this tick (aggregates were reset).
    pub game_started: bool,
    /// Scoring ended on this tick; the game is over.
    pub terminal: bool,
}

pub struct EventExtractor {
    spawn_proximity: f32,
}

impl EventExtractor {
    pub fn new(spawn_proximity: f32) -> Self {
        Self { spawn_proximity }
    }

    pub fn extract(&self, prev: &Snapshot, curr: &Snapshot, meta: &GameMeta) -> TickDiff {
        let mut meta = meta.clone();
        let mut events = Vec::new();
        let tick = curr.tick;

        let game_started = !prev.engine_running && curr.engine_running;
        if game_started {
            events.push(Event::new(
                tick,
                EventKind::GameStarted {
                    map: curr.map_name.clone(),
                },
            ));
            meta.reset(curr.players.len());
            meta.started_at = Some(curr.captured_at);
        } else if meta.players.is_empty() && !curr.players.is_empty() {
            meta.reset(curr.players.len());
        }

        // Positional diffing is only sound while the player list is stable.
        let cardinality_ok = prev.players.len() == curr.players.len();
        if !cardinality_ok && !prev.players.is_empty() && !curr.players.is_empty() {
            debug!(
                "Player count changed ({} -> {}), deferring positional diff to next tick",
                prev.players.len(),
                curr.players.len()
            );
        }

        if curr.can_score && cardinality_ok {
            for (old, new) in prev.players.iter().zip(&curr.players) {
                self.diff_weapons(&mut events, &mut meta, tick, old, new);
            }
        }

        if curr.can_score {
            self.diff_damage(&mut events, &mut meta, tick, prev, curr);
        }

        if prev.engine_running && curr.engine_running && cardinality_ok {
            for (old, new) in prev.players.iter().zip(&curr.players) {
                self.diff_counters(&mut events, &mut meta, tick, old, new);
                self.diff_powerups(&mut events, &mut meta, tick, old, new);
            }
        }

        if curr.can_score && !curr.players.is_empty() && !curr.spawns.is_empty() {
            self.diff_spawns(&mut events, tick, prev, curr, cardinality_ok);
        }

        let terminal = prev.can_score && !curr.can_score;
        if terminal {
            events.push(Event::new(
                tick,
                EventKind::GameEnded {
                    map: curr.map_name.clone(),
                },
            ));
            meta.started_at = None;
        }

        TickDiff {
            events,
            meta,
            game_started,
            terminal,
        }
    }

    /// Shots and grenade throws. Weapon slots are matched by object id, not
    /// slot position; a swapped weapon never diffs against its predecessor.
    fn diff_weapons(
        &self,
        events: &mut Vec<Event>,
        meta: &mut GameMeta,
        tick: u32,
        old: &PlayerState,
        new: &PlayerState,
    ) {
        let (Some(old_dynamic), Some(new_dynamic)) = (&old.dynamic, &new.dynamic) else {
            return;
        };

        for weapon in &new_dynamic.weapons {
            let Some(old_weapon) = old_dynamic.weapon_by_object_id(weapon.object_id) else {
                continue;
            };
            let shots = if weapon.is_energy {
                // Charge is continuous; any decrease is one trigger pull.
                (old_weapon.charge > weapon.charge) as u32
            } else {
                (old_weapon.magazine_ammo - weapon.magazine_ammo).max(0) as u32
            };
            if shots > 0 {
                let player_meta = meta.player_mut(new.index);
                *player_meta
                    .shots_by_weapon
                    .entry(weapon.tag_name.clone())
                    .or_default() += shots;
                *player_meta.shots_by_tick.entry(tick).or_default() += shots;
            }
        }

        if old_dynamic.primary_grenades > new_dynamic.primary_grenades {
            events.push(Event::new(
                tick,
                EventKind::GrenadeThrown {
                    player: new.index,
                    name: new.name.clone(),
                    kind: GrenadeKind::Frag,
                },
            ));
        }
        if old_dynamic.secondary_grenades > new_dynamic.secondary_grenades {
            events.push(Event::new(
                tick,
                EventKind::GrenadeThrown {
                    player: new.index,
                    name: new.name.clone(),
                    kind: GrenadeKind::Plasma,
                },
            ));
        }
    }

    fn diff_damage(
        &self,
        events: &mut Vec<Event>,
        meta: &mut GameMeta,
        tick: u32,
        prev: &Snapshot,
        curr: &Snapshot,
    ) {
        for (&dealer, receivers) in &curr.damage_counts {
            for (&receiver, &amount) in receivers {
                let old_amount = prev.damage_for(dealer, receiver).unwrap_or(0.0);
                if amount <= old_amount {
                    continue;
                }
                let delta = amount - old_amount;
                events.push(Event::new(
                    tick,
                    EventKind::Damage {
                        dealer,
                        receiver,
                        amount: delta,
                    },
                ));
                let dealer_meta = meta.player_mut(dealer);
                dealer_meta.damage_dealt += delta;
                *dealer_meta.damage_dealt_by_tick.entry(tick).or_default() += delta;
                *dealer_meta.damage_to_player.entry(receiver).or_default() += delta;
                let receiver_meta = meta.player_mut(receiver);
                receiver_meta.damage_received += delta;
                *receiver_meta
                    .damage_received_by_tick
                    .entry(tick)
                    .or_default() += delta;
                *receiver_meta.damage_from_player.entry(dealer).or_default() += delta;
            }
        }
    }

    /// Kill/death/assist counters only move up within a game; a decrease
    /// here means the table went stale underneath us.
    fn diff_counters(
        &self,
        events: &mut Vec<Event>,
        meta: &mut GameMeta,
        tick: u32,
        old: &PlayerState,
        new: &PlayerState,
    ) {
        let pairs: [(i16, i16, fn(usize, String, i16) -> EventKind); 3] = [
            (old.kills, new.kills, |player, name, total| EventKind::Kill {
                player,
                name,
                total,
            }),
            (old.deaths, new.deaths, |player, name, total| {
                EventKind::Death {
                    player,
                    name,
                    total,
                }
            }),
            (old.assists, new.assists, |player, name, total| {
                EventKind::Assist {
                    player,
                    name,
                    total,
                }
            }),
        ];

        for (old_count, new_count, make) in pairs {
            if new_count < old_count {
                warn!(
                    "Counter for {} decreased {} -> {} without a game start; ignoring",
                    new.name, old_count, new_count
                );
                continue;
            }
            // One event per unit increase.
            for step in 1..=(new_count - old_count) {
                events.push(Event::new(
                    tick,
                    make(new.index, new.name.clone(), old_count + step),
                ));
            }
        }

        let delta = (new.kills - old.kills).max(0) as u32;
        if delta > 0 {
            *meta.player_mut(new.index).kills_by_tick.entry(tick).or_default() += delta;
        }
        let delta = (new.deaths - old.deaths).max(0) as u32;
        if delta > 0 {
            *meta
                .player_mut(new.index)
                .deaths_by_tick
                .entry(tick)
                .or_default() += delta;
        }
        let delta = (new.assists - old.assists).max(0) as u32;
        if delta > 0 {
            *meta
                .player_mut(new.index)
                .assists_by_tick
                .entry(tick)
                .or_default() += delta;
        }
    }

    fn diff_powerups(
        &self,
        events: &mut Vec<Event>,
        meta: &mut GameMeta,
        tick: u32,
        old: &PlayerState,
        new: &PlayerState,
    ) {
        let old_camo = old.dynamic.as_ref().is_some_and(|d| d.has_camo());
        let new_camo = new.dynamic.as_ref().is_some_and(|d| d.has_camo());
        if new_camo && !old_camo {
            events.push(Event::new(
                tick,
                EventKind::CamoAcquired {
                    player: new.index,
                    name: new.name.clone(),
                },
            ));
            let player_meta = meta.player_mut(new.index);
            player_meta.camo_count += 1;
            *player_meta.camo_by_tick.entry(tick).or_default() += 1;
        } else if old_camo && !new_camo {
            events.push(Event::new(
                tick,
                EventKind::CamoLost {
                    player: new.index,
                    name: new.name.clone(),
                },
            ));
        }

        let old_os = old.dynamic.as_ref().is_some_and(|d| d.has_overshield());
        let new_os = new.dynamic.as_ref().is_some_and(|d| d.has_overshield());
        if new_os && !old_os {
            events.push(Event::new(
                tick,
                EventKind::OvershieldAcquired {
                    player: new.index,
                    name: new.name.clone(),
                },
            ));
            let player_meta = meta.player_mut(new.index);
            player_meta.overshield_count += 1;
            *player_meta.overshield_by_tick.entry(tick).or_default() += 1;
        } else if old_os && !new_os {
            events.push(Event::new(
                tick,
                EventKind::OvershieldLost {
                    player: new.index,
                    name: new.name.clone(),
                },
            ));
        }
    }

    fn diff_spawns(
        &self,
        events: &mut Vec<Event>,
        tick: u32,
        prev: &Snapshot,
        curr: &Snapshot,
        cardinality_ok: bool,
    ) {
        for (index, new) in curr.players.iter().enumerate() {
            let old = if cardinality_ok {
                prev.players.get(index)
            } else if prev.players.is_empty() {
                None
            } else {
                // Indexes don't line up this tick; skip.
                continue;
            };

            let freshly_spawned = match old {
                None => new.dynamic.is_some(),
                Some(old) => old.dynamic.is_none() && new.dynamic.is_some(),
            };
            let Some(dynamic) = new.dynamic.as_ref() else {
                continue;
            };
            if !freshly_spawned {
                continue;
            }

            let spawn = self.match_spawn(curr, &curr.spawns, dynamic.position);
            events.push(Event::new(
                tick,
                EventKind::PlayerSpawned {
                    player: new.index,
                    name: new.name.clone(),
                    spawn,
                    position: dynamic.position,
                },
            ));
        }
    }

    /// First spawn point in list order within the proximity threshold whose
    /// game-type codes admit the current game type.
    fn match_spawn(
        &self,
        curr: &Snapshot,
        spawns: &[SpawnPoint],
        position: crate::game::Vec3,
    ) -> Option<u16> {
        spawns
            .iter()
            .find(|spawn| {
                curr.game_type.matches_any(&spawn.gametypes)
                    && spawn.position.distance_to(&position) <= self.spawn_proximity
            })
            .map(|spawn| spawn.index)
    }
}
