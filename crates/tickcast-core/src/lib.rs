//! # tickcast-core
//!
//! Core library for the Tickcast game-state observer.
//!
//! This crate provides:
//! - A QMP monitor channel and rate-limited guest address translation
//! - Cached guest-memory access (per-address and per-tick range caches)
//! - Game-state sampling into per-tick snapshots
//! - Tick-diff event extraction (shots, damage, kills, spawns, powerups)
//! - A fan-out hub for consumers and per-game event-log persistence
//!
//! The cost model behind the design: one monitor round trip costs
//! milliseconds, one direct host-memory read costs nanoseconds. Every layer
//! above the translator exists to keep steady-state ticks on the fast path.

pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod memory;
pub mod qmp;
pub mod sampler;
pub mod schema;
pub mod sink;
pub mod storage;
pub mod tracker;

pub use config::{Config, ContiguousRam, MonitorConfig, PollConfig};
pub use error::{Error, Result};
pub use events::{Event, EventExtractor, EventKind, GameMeta, PlayerMeta, TickDiff};
pub use game::{
    DamageEntry, DamageMatrix, GameType, GrenadeKind, ItemState, ObjectDetail, ObjectState,
    ObjectType, PlayerDynamic, PlayerState, Snapshot, SpawnPoint, TickStats, Vec3, WeaponState,
};
pub use memory::{MemorySession, ProcessHandle, ProcessInfo, RawMemory, ReadOptions, SessionStats};
pub use qmp::{AddressTranslator, Monitor, QmpChannel, Translate};
pub use sampler::GameStateSampler;
pub use schema::{LayoutSchema, TeamScoreTable};
pub use sink::{SnapshotHub, TickOutput};
pub use storage::GameRecorder;
pub use tracker::Tracker;
