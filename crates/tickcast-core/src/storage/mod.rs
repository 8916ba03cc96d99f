//! Persistence of per-game event logs.

mod recorder;

pub use recorder::GameRecorder;
