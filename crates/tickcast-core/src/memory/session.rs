use tracing::{debug, warn};

use crate::config::ContiguousRam;
use crate::error::{Error, Result};
use crate::memory::address_cache::AddressCache;
use crate::memory::decode::{self, Value, ValueKind};
use crate::memory::process::RawMemory;
use crate::memory::range_cache::RangeCache;
use crate::qmp::Translate;

/// Per-read behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// The address is already a host address; read it directly.
    pub host_address: bool,
    /// If the freshly read value differs from the cached one, force one
    /// re-translation and re-read. Catches allocations that moved under a
    /// stale cached mapping.
    pub retry_on_change: bool,
    /// Retain the decoded value in the address cache. Turned off for large
    /// or cold fields.
    pub keep_value: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            host_address: false,
            retry_on_change: false,
            keep_value: true,
        }
    }
}

impl ReadOptions {
    pub fn host() -> Self {
        Self {
            host_address: true,
            ..Self::default()
        }
    }

    pub fn watched() -> Self {
        Self {
            retry_on_change: true,
            ..Self::default()
        }
    }
}

/// Counters for one tick's worth of reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Direct host-memory reads this tick.
    pub live_reads: u64,
    /// Distinct guest addresses ever resolved.
    pub known_addresses: usize,
    /// How many of those needed a full translator round trip.
    pub translator_resolved: usize,
    /// Ranges currently registered.
    pub ranges: usize,
}

/// The memory engine's context object: owns the translator, both caches and
/// the raw process handle, and dispatches every typed read.
///
/// Constructed on attach, `reset()` on reconnect or new game, dropped on
/// detach. Owned by the polling thread; nothing here is shareable.
///
/// Resolution order for a guest read, first match wins:
/// 1. caller says it is already a host address;
/// 2. a range snapshotted this tick covers it;
/// 3. the address cache knows its host mapping (live read, with optional
///    changed-value re-translation);
/// 4. it sits in the contiguous guest-RAM region and the base mapping is
///    known, so the host address is base plus offset;
/// 5. full translator round trip.
pub struct MemorySession<R, T> {
    raw: R,
    translator: T,
    addresses: AddressCache,
    ranges: RangeCache,
    contiguous: ContiguousRam,
    live_reads: u64,
}

impl<R: RawMemory, T: Translate> MemorySession<R, T> {
    pub fn new(raw: R, translator: T, contiguous: ContiguousRam) -> Self {
        Self {
            raw,
            translator,
            addresses: AddressCache::new(),
            ranges: RangeCache::new(),
            contiguous,
            live_reads: 0,
        }
    }

    fn live_read(&mut self, host: u64, len: usize) -> Result<Vec<u8>> {
        self.live_reads += 1;
        self.raw.read_bytes(host, len)
    }

    /// Host address for the contiguous-RAM base, translating it once if it
    /// has never been resolved.
    fn base_host(&mut self) -> Result<u64> {
        let base = self.contiguous.guest_base;
        if let Some(host) = self.addresses.host_of(base) {
            return Ok(host);
        }
        let host = self.translator.translate(base)?;
        self.addresses.put_mapping(base, host, true);
        Ok(host)
    }

    fn contiguous_host(&mut self, guest: u64) -> Result<Option<u64>> {
        if !self.contiguous.enabled || guest < self.contiguous.guest_base {
            return Ok(None);
        }
        let base_host = self.base_host()?;
        Ok(Some(base_host + (guest - self.contiguous.guest_base)))
    }

    /// Resolve a guest address to a host address without reading a value.
    /// Used by range population and the write pass-through.
    pub fn resolve_host(&mut self, guest: u64) -> Result<u64> {
        if let Some(host) = self.addresses.host_of(guest) {
            return Ok(host);
        }
        if let Some(host) = self.ranges.host_of(guest) {
            self.addresses.put_mapping(guest, host, false);
            return Ok(host);
        }
        if let Some(host) = self.contiguous_host(guest)? {
            self.addresses.put_mapping(guest, host, false);
            return Ok(host);
        }
        let host = self.translator.translate(guest)?;
        self.addresses.put_mapping(guest, host, true);
        Ok(host)
    }

    /// Typed read of a fixed-width scalar.
    pub fn read_typed(&mut self, guest: u64, kind: ValueKind, opts: ReadOptions) -> Result<Value> {
        let size = kind
            .fixed_size()
            .ok_or_else(|| Error::Decode(format!("{:?} needs a length; use a string/bytes read", kind)))?;

        if opts.host_address {
            let bytes = self.live_read(guest, size)?;
            return decode::decode_scalar(&bytes, 0, kind);
        }

        // Tier 1: this tick's range snapshots.
        if let Some(hit) = self.ranges.lookup(guest, kind)? {
            let value = opts.keep_value.then(|| hit.value.clone());
            self.addresses.put(guest, hit.host, value, Some(kind), false);
            return Ok(hit.value);
        }

        // Tier 2: previously resolved address, live read.
        if let Some(known) = self.addresses.get(guest) {
            let mut host = known.host;
            let cached_value = known.last_value.clone();
            let bytes = self.live_read(host, size)?;
            let mut value = decode::decode_scalar(&bytes, 0, kind)?;
            let mut via_translator = false;

            if opts.retry_on_change
                && matches!(&cached_value, Some(old) if *old != value)
            {
                warn!(
                    "Value at guest {:#x} changed under cached mapping ({:?} -> {:?}), re-translating",
                    guest, cached_value, value
                );
                host = self.translator.translate(guest)?;
                let bytes = self.live_read(host, size)?;
                value = decode::decode_scalar(&bytes, 0, kind)?;
                via_translator = true;
            }

            let keep = opts.keep_value.then(|| value.clone());
            self.addresses.put(guest, host, keep, Some(kind), via_translator);
            return Ok(value);
        }

        // Tier 3: contiguous guest RAM, host address by constant offset.
        if let Some(host) = self.contiguous_host(guest)? {
            let bytes = self.live_read(host, size)?;
            let value = decode::decode_scalar(&bytes, 0, kind)?;
            let keep = opts.keep_value.then(|| value.clone());
            self.addresses.put(guest, host, keep, Some(kind), false);
            return Ok(value);
        }

        // Tier 4: full translation. Provenance recorded for diagnostics.
        let host = self.translator.translate(guest)?;
        debug!("Translator fallback for guest {:#x}", guest);
        let bytes = self.live_read(host, size)?;
        let value = decode::decode_scalar(&bytes, 0, kind)?;
        let keep = opts.keep_value.then(|| value.clone());
        self.addresses.put(guest, host, keep, Some(kind), true);
        Ok(value)
    }

    /// Raw byte read. Values are never retained for byte reads, only the
    /// host mapping.
    pub fn read_bytes(&mut self, guest: u64, len: usize) -> Result<Vec<u8>> {
        if let Some(hit) = self.ranges.lookup_bytes(guest, len) {
            self.addresses.put_mapping(guest, hit.host, false);
            if let Value::Bytes(bytes) = hit.value {
                return Ok(bytes);
            }
        }
        let host = self.resolve_host(guest)?;
        self.live_read(host, len)
    }

    /// Null-terminated UTF-8 string, bounded by `max_len` bytes.
    pub fn read_utf8(&mut self, guest: u64, max_len: usize) -> Result<String> {
        if let Some(hit) = self.ranges.lookup_string(guest, ValueKind::Utf8, max_len) {
            self.addresses.put_mapping(guest, hit.host, false);
            if let Value::Text(text) = hit.value {
                return Ok(text);
            }
        }
        let host = self.resolve_host(guest)?;
        let bytes = self.live_read(host, max_len)?;
        Ok(decode::decode_utf8(&bytes, max_len))
    }

    /// Null-terminated UTF-16LE string, bounded by `max_len` bytes.
    pub fn read_utf16(&mut self, guest: u64, max_len: usize) -> Result<String> {
        if let Some(hit) = self.ranges.lookup_string(guest, ValueKind::Utf16, max_len) {
            self.addresses.put_mapping(guest, hit.host, false);
            if let Value::Text(text) = hit.value {
                return Ok(text);
            }
        }
        let host = self.resolve_host(guest)?;
        let bytes = self.live_read(host, max_len)?;
        Ok(decode::decode_utf16(&bytes, max_len))
    }

    pub fn read_u8(&mut self, guest: u64) -> Result<u8> {
        Ok(self.read_typed(guest, ValueKind::U8, ReadOptions::default())?
            .as_u64()
            .unwrap_or(0) as u8)
    }

    pub fn read_u16(&mut self, guest: u64) -> Result<u16> {
        Ok(self.read_typed(guest, ValueKind::U16, ReadOptions::default())?
            .as_u64()
            .unwrap_or(0) as u16)
    }

    pub fn read_u32(&mut self, guest: u64) -> Result<u32> {
        Ok(self.read_typed(guest, ValueKind::U32, ReadOptions::default())?
            .as_u64()
            .unwrap_or(0) as u32)
    }

    pub fn read_u64(&mut self, guest: u64) -> Result<u64> {
        Ok(self.read_typed(guest, ValueKind::U64, ReadOptions::default())?
            .as_u64()
            .unwrap_or(0))
    }

    pub fn read_i8(&mut self, guest: u64) -> Result<i8> {
        Ok(self.read_typed(guest, ValueKind::I8, ReadOptions::default())?
            .as_i64()
            .unwrap_or(0) as i8)
    }

    pub fn read_i16(&mut self, guest: u64) -> Result<i16> {
        Ok(self.read_typed(guest, ValueKind::I16, ReadOptions::default())?
            .as_i64()
            .unwrap_or(0) as i16)
    }

    pub fn read_i32(&mut self, guest: u64) -> Result<i32> {
        Ok(self.read_typed(guest, ValueKind::I32, ReadOptions::default())?
            .as_i64()
            .unwrap_or(0) as i32)
    }

    pub fn read_f32(&mut self, guest: u64) -> Result<f32> {
        Ok(self.read_typed(guest, ValueKind::F32, ReadOptions::default())?
            .as_f32()
            .unwrap_or(0.0))
    }

    /// Snapshot `len` bytes at `base` into the range cache: one host
    /// resolution, one bulk read. When the host mapping cannot be read from
    /// this process, the bytes come through the monitor instead.
    pub fn add_range(&mut self, base: u64, len: usize) -> Result<()> {
        let host = self.resolve_host(base)?;
        let bytes = match self.live_read(host, len) {
            Ok(bytes) => bytes,
            Err(e) if e.is_memory_fault() => {
                debug!(
                    "Host read for range {:#x}+{:#x} failed ({}), reading via monitor",
                    base, len, e
                );
                self.translator.read_guest(base, len)?
            }
            Err(e) => return Err(e),
        };
        self.ranges.insert(base, host, bytes);
        Ok(())
    }

    /// Write pass-through: resolve the guest address and write directly.
    /// Written values are not cached.
    pub fn write_bytes(&mut self, guest: u64, bytes: &[u8]) -> Result<()> {
        let host = self.resolve_host(guest)?;
        self.raw.write_bytes(host, bytes)
    }

    /// Clear this tick's range snapshots. Must run at the end of every tick.
    pub fn invalidate_ranges(&mut self) {
        self.ranges.invalidate();
    }

    /// Reset the per-tick read counter at a tick boundary.
    pub fn begin_tick(&mut self) {
        self.live_reads = 0;
    }

    /// Drop everything learned about the guest's memory layout. Called on
    /// translator reconnect and on new game, when mappings may have moved.
    pub fn reset(&mut self) {
        self.addresses.clear();
        self.ranges.invalidate();
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            live_reads: self.live_reads,
            known_addresses: self.addresses.len(),
            translator_resolved: self.addresses.translator_resolved(),
            ranges: self.ranges.len(),
        }
    }

    pub fn translator_mut(&mut self) -> &mut T {
        &mut self.translator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::{MOCK_HOST_OFFSET, MockMemory, MockTranslator, MockWorld};

    type TestSession = MemorySession<MockMemory, MockTranslator>;

    fn session(world: &MockWorld) -> TestSession {
        MemorySession::new(
            MockMemory::new(world.clone()),
            MockTranslator::new(world.clone()),
            ContiguousRam::default(),
        )
    }

    fn translator_calls(session: &TestSession) -> u32 {
        session.translator.calls
    }

    #[test]
    fn test_first_read_translates_then_caches() {
        let world = MockWorld::new();
        world.write_u32(0x2fad28, 0xdead_beef);
        let mut s = session(&world);

        assert_eq!(s.read_u32(0x2fad28).unwrap(), 0xdead_beef);
        assert_eq!(translator_calls(&s), 1);

        // Second read hits the address cache.
        assert_eq!(s.read_u32(0x2fad28).unwrap(), 0xdead_beef);
        assert_eq!(translator_calls(&s), 1);
    }

    #[test]
    fn test_range_hit_never_invokes_translator() {
        let world = MockWorld::new();
        world.write_u32(0x1000, 7);
        world.write_u32(0x1004, 8);
        let mut s = session(&world);

        assert_eq!(s.read_u32(0x1000).unwrap(), 7);
        let calls_before = translator_calls(&s);

        s.add_range(0x1000, 8).unwrap();
        assert_eq!(s.read_u32(0x1000).unwrap(), 7);
        assert_eq!(s.read_u32(0x1004).unwrap(), 8);
        assert_eq!(translator_calls(&s), calls_before);
    }

    #[test]
    fn test_invalidate_clears_ranges_but_not_addresses() {
        let world = MockWorld::new();
        world.write_u32(0x1000, 7);
        let mut s = session(&world);

        s.add_range(0x1000, 4).unwrap();
        s.invalidate_ranges();
        assert_eq!(s.stats().ranges, 0);

        // Still readable through the address cache, no new translation.
        let calls = translator_calls(&s);
        assert_eq!(s.read_u32(0x1000).unwrap(), 7);
        assert_eq!(translator_calls(&s), calls);
    }

    #[test]
    fn test_contiguous_ram_shortcut() {
        let world = MockWorld::new();
        world.write_u32(0x8000_0000, 1);
        world.write_u32(0x8001_2340, 99);
        let mut s = session(&world);

        // Resolving the base costs one translation; everything above it is
        // plain offset math.
        assert_eq!(s.read_u32(0x8001_2340).unwrap(), 99);
        assert_eq!(translator_calls(&s), 1);

        world.write_u32(0x8005_0000, 123);
        assert_eq!(s.read_u32(0x8005_0000).unwrap(), 123);
        assert_eq!(translator_calls(&s), 1);
    }

    #[test]
    fn test_contiguous_ram_disabled_falls_back() {
        let world = MockWorld::new();
        world.write_u32(0x8001_0000, 5);
        let mut s = MemorySession::new(
            MockMemory::new(world.clone()),
            MockTranslator::new(world.clone()),
            ContiguousRam {
                enabled: false,
                guest_base: 0x8000_0000,
            },
        );
        assert_eq!(s.read_u32(0x8001_0000).unwrap(), 5);
        // Full translation of the exact address, not the base.
        assert_eq!(s.translator.calls, 1);
    }

    #[test]
    fn test_retry_on_change_retranslates_once() {
        let world = MockWorld::new();
        world.write_u32(0x4000, 5);
        let mut s = session(&world);

        assert_eq!(s.read_u32(0x4000).unwrap(), 5);
        let calls = translator_calls(&s);

        // The value moves under the cached mapping.
        world.write_u32(0x4000, 6);
        let value = s
            .read_typed(0x4000, ValueKind::U32, ReadOptions::watched())
            .unwrap();
        assert_eq!(value, Value::Unsigned(6));
        assert_eq!(translator_calls(&s), calls + 1);
    }

    #[test]
    fn test_unmapped_address_not_cached() {
        let world = MockWorld::new();
        let mut s = session(&world);
        s.translator.mark_unmapped(0x6000);

        assert!(matches!(
            s.read_u32(0x6000).unwrap_err(),
            Error::Unmapped { guest: 0x6000 }
        ));
        assert_eq!(s.addresses.get(0x6000).map(|k| k.host), None);
    }

    #[test]
    fn test_host_address_read_bypasses_translation() {
        let world = MockWorld::new();
        world.write_u32(0x3000, 17);
        let mut s = session(&world);

        let value = s
            .read_typed(MOCK_HOST_OFFSET + 0x3000, ValueKind::U32, ReadOptions::host())
            .unwrap();
        assert_eq!(value, Value::Unsigned(17));
        assert_eq!(translator_calls(&s), 0);
    }

    #[test]
    fn test_range_falls_back_to_monitor_read() {
        // Raw memory with no readable mappings, like a target whose memory
        // has not been opened yet.
        struct UnreadableMemory;

        impl RawMemory for UnreadableMemory {
            fn read_bytes(&self, host: u64, _len: usize) -> Result<Vec<u8>> {
                Err(Error::MemoryFault {
                    address: host,
                    message: "no mapping".to_string(),
                })
            }

            fn write_bytes(&self, host: u64, _bytes: &[u8]) -> Result<()> {
                Err(Error::MemoryFault {
                    address: host,
                    message: "no mapping".to_string(),
                })
            }
        }

        let world = MockWorld::new();
        world.write_u32(0x1000, 31);
        let mut s = MemorySession::new(
            UnreadableMemory,
            MockTranslator::new(world.clone()),
            ContiguousRam::default(),
        );

        s.add_range(0x1000, 4).unwrap();
        assert_eq!(s.read_u32(0x1000).unwrap(), 31);
    }

    #[test]
    fn test_string_reads() {
        let world = MockWorld::new();
        world.write_str(0x5000, "prisoner");
        world.write_wstr(0x5100, "New Mombasa");
        let mut s = session(&world);

        assert_eq!(s.read_utf8(0x5000, 32).unwrap(), "prisoner");
        assert_eq!(s.read_utf16(0x5100, 64).unwrap(), "New Mombasa");
    }

    #[test]
    fn test_string_read_from_range() {
        let world = MockWorld::new();
        world.write_str(0x5000, "chillout");
        let mut s = session(&world);
        s.add_range(0x5000, 16).unwrap();
        let calls = translator_calls(&s);
        assert_eq!(s.read_utf8(0x5000, 16).unwrap(), "chillout");
        assert_eq!(translator_calls(&s), calls);
    }

    #[test]
    fn test_write_round_trip() {
        let world = MockWorld::new();
        world.write_u32(0x7000, 0);
        let mut s = session(&world);

        s.write_bytes(0x7000, &42u32.to_le_bytes()).unwrap();
        assert_eq!(s.read_u32(0x7000).unwrap(), 42);
    }

    #[test]
    fn test_reset_forces_retranslation() {
        let world = MockWorld::new();
        world.write_u32(0x1000, 9);
        let mut s = session(&world);

        assert_eq!(s.read_u32(0x1000).unwrap(), 9);
        s.reset();
        assert_eq!(s.read_u32(0x1000).unwrap(), 9);
        assert_eq!(translator_calls(&s), 2);
    }
}
