//! Declarative memory layout for the observed game build.
//!
//! Anchors (table addresses) are data, loadable from JSON; struct-internal
//! offsets are constants. The sampler is the only consumer.

pub mod layout;

mod anchors;

pub use anchors::{LayoutSchema, TeamScoreTable};
