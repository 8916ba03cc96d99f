//! Monitor channel to the emulator.
//!
//! The emulator exposes a QMP (QEMU Monitor Protocol) socket. Everything the
//! engine needs from it goes through `human-monitor-command`: guest-virtual
//! to guest-physical translation, guest-physical to host-virtual translation,
//! raw guest byte reads, and pause/resume control. Monitor round trips are
//! orders of magnitude slower than direct host-memory reads, which is why
//! the memory layer caches so aggressively.

mod channel;
mod translator;

pub use channel::{Monitor, QmpChannel};
pub use translator::{AddressTranslator, Translate};
