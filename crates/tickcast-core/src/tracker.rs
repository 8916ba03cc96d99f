//! The polling loop: tick detection, sampling, diffing, publishing.
//!
//! Single-threaded by design. The read path mutates caches and issues
//! monitor requests, none of which tolerates interleaving against a moving
//! target, so one thread owns the session and runs the whole
//! sample-and-diff pipeline synchronously per tick. Consumers get their
//! copies through the hub and never touch the session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventExtractor, GameMeta};
use crate::game::{Snapshot, TickStats};
use crate::memory::{MemorySession, RawMemory};
use crate::qmp::Translate;
use crate::sampler::GameStateSampler;
use crate::sink::{SnapshotHub, TickOutput};

/// Queue depth for each consumer; at 30 ticks a second this is about two
/// seconds of slack.
const HUB_CAPACITY: usize = 64;

/// Pause before resuming the poll after an unexpected tick failure.
const FAULT_BACKOFF: Duration = Duration::from_millis(500);

pub struct Tracker<R, T> {
    session: MemorySession<R, T>,
    sampler: GameStateSampler,
    extractor: EventExtractor,
    hub: SnapshotHub,
    meta: GameMeta,
    prev: Snapshot,
    poll_idle: Duration,
    tick_budget: Duration,
    last_counter: Option<u32>,
    pending_writes: VecDeque<(u64, Vec<u8>)>,
}

impl<R: RawMemory, T: Translate> Tracker<R, T> {
    pub fn new(session: MemorySession<R, T>, sampler: GameStateSampler, config: &Config) -> Self {
        Self {
            session,
            sampler,
            extractor: EventExtractor::new(config.spawn_proximity_or_default()),
            hub: SnapshotHub::new(HUB_CAPACITY),
            meta: GameMeta::new(),
            prev: Snapshot::empty(),
            poll_idle: Duration::from_micros(config.poll.idle_sleep_us),
            tick_budget: Duration::from_millis(config.poll.tick_budget_ms),
            last_counter: None,
            pending_writes: VecDeque::new(),
        }
    }

    pub fn subscribe(&mut self, name: &str) -> Receiver<TickOutput> {
        self.hub.subscribe(name)
    }

    /// Queue a guest-memory write; applied at the next tick boundary,
    /// before sampling.
    pub fn queue_write(&mut self, guest: u64, bytes: Vec<u8>) {
        self.pending_writes.push_back((guest, bytes));
    }

    /// Poll until the shutdown flag is raised. Tick faults recover in-loop;
    /// only translator retry exhaustion escapes as an error.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!("Tracker started");
        while !shutdown.load(Ordering::Relaxed) {
            match self.poll_once() {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.poll_idle),
                Err(e) => self.recover(e)?,
            }
        }
        info!("Tracker stopped");
        Ok(())
    }

    /// One poll of the tick counter; processes the tick if it moved.
    /// Returns whether a tick was processed.
    fn poll_once(&mut self) -> Result<bool> {
        let counter = self.sampler.current_tick(&mut self.session)?;
        if Some(counter) == self.last_counter {
            return Ok(false);
        }
        self.process_tick(counter)?;
        Ok(true)
    }

    fn process_tick(&mut self, counter: u32) -> Result<()> {
        let started = Instant::now();
        self.session.begin_tick();

        let sampled = self.sample_tick();
        // Ranges must not survive the tick, sample success or not; a stale
        // entry would shadow the next tick's snapshot of the same region.
        self.session.invalidate_ranges();
        let snapshot = sampled?;

        if let Some(last) = self.last_counter {
            let gap = counter.wrapping_sub(last);
            if gap > 1 && self.prev.engine_running && snapshot.engine_running {
                warn!("Missed {} tick(s) between {} and {}", gap - 1, last, counter);
            }
        }
        self.last_counter = Some(counter);

        let diff = self.extractor.extract(&self.prev, &snapshot, &self.meta);
        if diff.game_started {
            // New game may mean a new map; drop the per-map caches.
            self.sampler.clear_scenario_cache();
        }
        self.meta = diff.meta;

        let session_stats = self.session.stats();
        let elapsed = started.elapsed();
        let output = TickOutput {
            snapshot: snapshot.clone(),
            events: diff.events,
            stats: TickStats {
                sample_ms: elapsed.as_millis() as u64,
                live_reads: session_stats.live_reads,
                translator_resolved: session_stats.translator_resolved,
            },
            game_started: diff.game_started,
            game_ended: diff.terminal,
        };
        self.hub.publish(&output);
        self.prev = snapshot;

        if elapsed > self.tick_budget {
            warn!(
                "Tick {} took {}ms (budget {}ms)",
                counter,
                elapsed.as_millis(),
                self.tick_budget.as_millis()
            );
        }
        Ok(())
    }

    /// Range population, queued writes, then the full sample. Any failure
    /// aborts the tick; the caller owns range invalidation.
    fn sample_tick(&mut self) -> Result<Snapshot> {
        self.sampler.populate_ranges(&mut self.session)?;
        self.apply_pending_writes();
        self.sampler.sample(&mut self.session)
    }

    fn apply_pending_writes(&mut self) {
        while let Some((guest, bytes)) = self.pending_writes.pop_front() {
            if let Err(e) = self.session.write_bytes(guest, &bytes) {
                warn!("Dropping queued write to {:#x}: {}", guest, e);
            }
        }
    }

    /// Tick-failure ladder: memory faults abort the tick and keep the
    /// caches; channel faults reconnect the monitor and reset the session;
    /// anything else clears the caches and backs off until the target is
    /// healthy again. Reconnect exhaustion is fatal.
    fn recover(&mut self, error: Error) -> Result<()> {
        if error.is_memory_fault() {
            debug!("Aborting tick after memory fault: {}", error);
            return Ok(());
        }
        if error.is_channel_fault() {
            warn!("Monitor channel fault ({}), reconnecting", error);
            self.session.translator_mut().reconnect()?;
            // Host mappings may have changed across the reconnect.
            self.session.reset();
            return Ok(());
        }
        warn!("Unexpected tick failure ({}), clearing caches", error);
        self.session.reset();
        thread::sleep(FAULT_BACKOFF);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContiguousRam;
    use crate::memory::mock::{MockMemory, MockTranslator, MockWorld};
    use crate::schema::LayoutSchema;

    // With an all-zero world the globals pointer dereferences to zero, so
    // the tick counter lives at guest 0xC and everything samples as a
    // pre-game menu state.
    const TICK_COUNTER: u64 = 0xC;

    fn tracker(world: &MockWorld) -> Tracker<MockMemory, MockTranslator> {
        let session = MemorySession::new(
            MockMemory::new(world.clone()),
            MockTranslator::new(world.clone()),
            ContiguousRam::default(),
        );
        Tracker::new(
            session,
            GameStateSampler::new(LayoutSchema::default()),
            &Config::default(),
        )
    }

    #[test]
    fn test_tick_change_publishes_snapshot() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let mut t = tracker(&world);
        let rx = t.subscribe("test");

        assert!(t.poll_once().unwrap());
        let output = rx.try_recv().unwrap();
        assert_eq!(output.snapshot.tick, 4);
        assert!(!output.snapshot.engine_running);
    }

    #[test]
    fn test_unchanged_counter_is_idle() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let mut t = tracker(&world);
        let rx = t.subscribe("test");

        assert!(t.poll_once().unwrap());
        assert!(!t.poll_once().unwrap());
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_pending_write_applied_at_tick_boundary() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let mut t = tracker(&world);

        t.queue_write(0x5000, 7u32.to_le_bytes().to_vec());
        assert!(t.poll_once().unwrap());
        assert!(t.pending_writes.is_empty());
        assert_eq!(t.session.read_u32(0x5000).unwrap(), 7);
    }

    #[test]
    fn test_memory_fault_recovery_keeps_caches() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let mut t = tracker(&world);
        assert!(t.poll_once().unwrap());

        let known = t.session.stats().known_addresses;
        t.recover(Error::Unmapped { guest: 0x1234 }).unwrap();
        assert_eq!(t.session.stats().known_addresses, known);
    }

    #[test]
    fn test_aborted_tick_drops_range_snapshots() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let schema = LayoutSchema::default();
        world.write_u32(schema.game_state_region_ptr, 0x10000);
        world.write_u32(schema.game_state_region_size, 0x100);
        world.write_u32(0x10040, 111);

        let mut t = tracker(&world);
        t.session.translator_mut().mark_unmapped(schema.scenario_ptr);

        // The game-state range gets snapshotted, then the scenario pointer
        // read faults and aborts the tick.
        let err = t.poll_once().unwrap_err();
        assert!(err.is_memory_fault());
        t.recover(err).unwrap();
        assert_eq!(t.session.stats().ranges, 0);

        // A fresh snapshot of the region must serve current bytes, not the
        // aborted tick's copy.
        world.write_u32(0x10040, 222);
        t.session.add_range(0x10000, 0x100).unwrap();
        assert_eq!(t.session.read_u32(0x10040).unwrap(), 222);
    }

    #[test]
    fn test_channel_fault_reconnects_and_resets() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let mut t = tracker(&world);
        assert!(t.poll_once().unwrap());
        assert!(t.session.stats().known_addresses > 0);

        t.recover(Error::Disconnected).unwrap();
        assert_eq!(t.session.translator_mut().reconnects, 1);
        assert_eq!(t.session.stats().known_addresses, 0);
    }

    #[test]
    fn test_run_honors_shutdown_flag() {
        let world = MockWorld::new();
        let mut t = tracker(&world);
        let stop = AtomicBool::new(true);
        t.run(&stop).unwrap();
    }

    #[test]
    fn test_consecutive_ticks_diff_in_order() {
        let world = MockWorld::new();
        world.write_u32(TICK_COUNTER, 5);
        let mut t = tracker(&world);
        let rx = t.subscribe("test");

        assert!(t.poll_once().unwrap());
        world.write_u32(TICK_COUNTER, 6);
        assert!(t.poll_once().unwrap());

        let ticks: Vec<u32> = rx.try_iter().map(|o| o.snapshot.tick).collect();
        assert_eq!(ticks, vec![4, 5]);
    }
}
