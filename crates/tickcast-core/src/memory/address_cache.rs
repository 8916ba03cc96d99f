use std::collections::HashMap;

use crate::memory::decode::{Value, ValueKind};

/// Last known resolution of one guest address.
#[derive(Debug, Clone)]
pub struct KnownAddress {
    pub host: u64,
    /// Value seen on the most recent read; `None` when the caller opted out
    /// of retention (large or cold fields).
    pub last_value: Option<Value>,
    pub kind: Option<ValueKind>,
    /// True when this mapping came from a full translator round trip rather
    /// than a range hit or the contiguous-RAM shortcut. Cache-quality
    /// diagnostic, not used for correctness.
    pub via_translator: bool,
}

/// Per-address memoization of guest-to-host resolutions.
///
/// Entries never expire on their own; the set of distinct guest addresses a
/// schema touches is fixed and small, so growth is bounded in practice.
/// Cleared only by explicit reset (translator reconnect, new game).
#[derive(Debug, Default)]
pub struct AddressCache {
    entries: HashMap<u64, KnownAddress>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guest: u64) -> Option<&KnownAddress> {
        self.entries.get(&guest)
    }

    pub fn host_of(&self, guest: u64) -> Option<u64> {
        self.entries.get(&guest).map(|known| known.host)
    }

    pub fn put(
        &mut self,
        guest: u64,
        host: u64,
        value: Option<Value>,
        kind: Option<ValueKind>,
        via_translator: bool,
    ) {
        self.entries.insert(
            guest,
            KnownAddress {
                host,
                last_value: value,
                kind,
                via_translator,
            },
        );
    }

    /// Record a bare mapping without a value (base-pointer resolutions).
    pub fn put_mapping(&mut self, guest: u64, host: u64, via_translator: bool) {
        self.entries
            .entry(guest)
            .and_modify(|known| {
                known.host = host;
                known.via_translator = via_translator;
            })
            .or_insert(KnownAddress {
                host,
                last_value: None,
                kind: None,
                via_translator,
            });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many entries required a translator round trip. High counts point
    /// at fields the range cache should be covering.
    pub fn translator_resolved(&self) -> usize {
        self.entries.values().filter(|k| k.via_translator).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let mut cache = AddressCache::new();
        cache.put(
            0x2fad28,
            0x7f00_0000_1000,
            Some(Value::Unsigned(42)),
            Some(ValueKind::U32),
            true,
        );

        let known = cache.get(0x2fad28).unwrap();
        assert_eq!(known.host, 0x7f00_0000_1000);
        assert_eq!(known.last_value, Some(Value::Unsigned(42)));
        assert!(known.via_translator);
        assert_eq!(cache.host_of(0x2fad28), Some(0x7f00_0000_1000));
        assert_eq!(cache.host_of(0x1), None);
    }

    #[test]
    fn test_put_mapping_preserves_value() {
        let mut cache = AddressCache::new();
        cache.put(
            0x1000,
            0xaaaa,
            Some(Value::Unsigned(7)),
            Some(ValueKind::U8),
            false,
        );
        cache.put_mapping(0x1000, 0xbbbb, true);

        let known = cache.get(0x1000).unwrap();
        assert_eq!(known.host, 0xbbbb);
        assert_eq!(known.last_value, Some(Value::Unsigned(7)));
    }

    #[test]
    fn test_translator_provenance_count() {
        let mut cache = AddressCache::new();
        cache.put_mapping(0x1, 0x10, true);
        cache.put_mapping(0x2, 0x20, false);
        cache.put_mapping(0x3, 0x30, true);
        assert_eq!(cache.translator_resolved(), 2);
    }

    #[test]
    fn test_clear() {
        let mut cache = AddressCache::new();
        cache.put_mapping(0x1, 0x10, false);
        cache.clear();
        assert!(cache.is_empty());
    }
}
