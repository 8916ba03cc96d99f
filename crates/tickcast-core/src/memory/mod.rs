//! Guest-memory access engine.
//!
//! Layers, bottom up: raw host-process reads ([`RawMemory`]), decoding of
//! little-endian scalars and strings ([`decode`]), two caches (per-address
//! memoization and per-tick range snapshots), and the [`MemorySession`] that
//! ties them to the monitor-backed address translator.

pub mod decode;

mod address_cache;
mod process;
mod range_cache;
mod session;

pub use address_cache::{AddressCache, KnownAddress};
pub use process::{ProcessHandle, ProcessInfo, RawMemory};
pub use range_cache::{RangeCache, RangeEntry, RangeHit};
pub use session::{MemorySession, ReadOptions, SessionStats};

#[cfg(test)]
pub mod mock;
