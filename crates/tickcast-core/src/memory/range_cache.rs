use crate::error::Result;
use crate::memory::decode::{self, Value, ValueKind};

/// One snapshotted region of contiguous guest memory.
#[derive(Debug, Clone)]
pub struct RangeEntry {
    pub start: u64,
    pub end: u64,
    pub host_base: u64,
    pub bytes: Vec<u8>,
}

/// A value served from a cached range, along with the host address it lives
/// at (so the address cache can be refreshed without a translation).
#[derive(Debug, Clone)]
pub struct RangeHit {
    pub value: Value,
    pub host: u64,
}

/// Per-tick snapshots of whole memory regions.
///
/// Populated at the start of a tick with the regions the sampler will walk
/// (player table, scenario data, game state), so the thousands of per-field
/// reads that follow decode straight out of process-local buffers. Must be
/// invalidated at the end of every tick; a stale range would silently serve
/// the previous tick's world.
#[derive(Debug, Default)]
pub struct RangeCache {
    ranges: Vec<RangeEntry>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot of `[start, start + bytes.len())`. Ranges are
    /// checked in insertion order on lookup; the first covering range wins.
    pub fn insert(&mut self, start: u64, host_base: u64, bytes: Vec<u8>) {
        let end = start + bytes.len() as u64;
        self.ranges.push(RangeEntry {
            start,
            end,
            host_base,
            bytes,
        });
    }

    fn covering(&self, guest: u64, len: usize) -> Option<&RangeEntry> {
        self.ranges
            .iter()
            .find(|r| guest >= r.start && guest + len as u64 <= r.end)
    }

    /// Decode a fixed-width scalar from a covering range, if any.
    pub fn lookup(&self, guest: u64, kind: ValueKind) -> Result<Option<RangeHit>> {
        let size = kind.fixed_size().unwrap_or(0);
        let Some(range) = self.covering(guest, size) else {
            return Ok(None);
        };
        let offset = (guest - range.start) as usize;
        let value = decode::decode_scalar(&range.bytes, offset, kind)?;
        Ok(Some(RangeHit {
            value,
            host: range.host_base + offset as u64,
        }))
    }

    /// Copy raw bytes out of a covering range.
    pub fn lookup_bytes(&self, guest: u64, len: usize) -> Option<RangeHit> {
        let range = self.covering(guest, len)?;
        let offset = (guest - range.start) as usize;
        Some(RangeHit {
            value: Value::Bytes(range.bytes[offset..offset + len].to_vec()),
            host: range.host_base + offset as u64,
        })
    }

    /// Decode a terminator-bounded string from a covering range. The window
    /// is clipped to the range end, matching the live-read bound semantics.
    pub fn lookup_string(&self, guest: u64, kind: ValueKind, max_len: usize) -> Option<RangeHit> {
        // Strings only need the first byte covered; the window shrinks at
        // the range boundary.
        let range = self.covering(guest, 1)?;
        let offset = (guest - range.start) as usize;
        let window = &range.bytes[offset..];
        let text = match kind {
            ValueKind::Utf8 => decode::decode_utf8(window, max_len),
            ValueKind::Utf16 => decode::decode_utf16(window, max_len),
            _ => return None,
        };
        Some(RangeHit {
            value: Value::Text(text),
            host: range.host_base + offset as u64,
        })
    }

    /// Host address for a guest address inside a cached range.
    pub fn host_of(&self, guest: u64) -> Option<u64> {
        let range = self.covering(guest, 1)?;
        Some(range.host_base + (guest - range.start))
    }

    /// Drop all ranges. Called at the end of every tick.
    pub fn invalidate(&mut self) {
        self.ranges.clear();
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_range() -> RangeCache {
        let mut cache = RangeCache::new();
        // 16 bytes at guest 0x1000, host 0x9000.
        cache.insert(
            0x1000,
            0x9000,
            vec![
                0x01, 0x00, 0x00, 0x00, //
                0x02, 0x00, 0x00, 0x00, //
                b'r', b'a', b't', 0x00, //
                0xff, 0xff, 0xff, 0xff,
            ],
        );
        cache
    }

    #[test]
    fn test_lookup_hit() {
        let cache = cache_with_range();
        let hit = cache.lookup(0x1004, ValueKind::U32).unwrap().unwrap();
        assert_eq!(hit.value, Value::Unsigned(2));
        assert_eq!(hit.host, 0x9004);
    }

    #[test]
    fn test_lookup_miss_outside_range() {
        let cache = cache_with_range();
        assert!(cache.lookup(0x2000, ValueKind::U32).unwrap().is_none());
        // Last byte covered but the full scalar is not.
        assert!(cache.lookup(0x100e, ValueKind::U32).unwrap().is_none());
    }

    #[test]
    fn test_lookup_string() {
        let cache = cache_with_range();
        let hit = cache.lookup_string(0x1008, ValueKind::Utf8, 32).unwrap();
        assert_eq!(hit.value, Value::Text("rat".to_string()));
    }

    #[test]
    fn test_first_covering_range_wins() {
        let mut cache = RangeCache::new();
        cache.insert(0x1000, 0x9000, vec![0xaa; 8]);
        cache.insert(0x1000, 0xb000, vec![0xbb; 8]);
        let hit = cache.lookup(0x1000, ValueKind::U8).unwrap().unwrap();
        assert_eq!(hit.value, Value::Unsigned(0xaa));
        assert_eq!(hit.host, 0x9000);
    }

    #[test]
    fn test_invalidate_always_misses() {
        let mut cache = cache_with_range();
        cache.invalidate();
        assert!(cache.lookup(0x1000, ValueKind::U32).unwrap().is_none());
        assert!(cache.lookup_bytes(0x1000, 4).is_none());
        assert!(cache.is_empty());
    }
}
