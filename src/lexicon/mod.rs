//! Lexicon loading and the immutable per-user snapshot.

pub mod loader;
pub mod snapshot;
pub mod store;

pub use loader::LexiconLoader;
pub use snapshot::{PostprocessFlags, Snapshot, SnapshotBuilder, StageSwitches};
pub use store::{JsonDirStore, LexiconStore, MemoryStore};
