//! Tick-diff event extraction and cross-tick aggregates.

mod event;
mod extractor;
mod meta;

pub use event::{Event, EventKind};
pub use extractor::{EventExtractor, TickDiff};
pub use meta::{GameMeta, PlayerMeta};
