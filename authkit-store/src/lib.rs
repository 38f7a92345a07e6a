//! Minimal transactional key-value storage for AuthKit.
//!
//! This crate provides the persistence primitives the core crate builds its
//! token storage on: a small, object-safe [`KvBackend`] trait over a
//! namespaced string key-value space, plus two implementations:
//!
//! * [`MemoryBackend`] — `HashMap`-backed, for tests and ephemeral use. It
//!   can simulate commit failures so error paths are testable.
//! * [`FileBackend`] — one JSON document per namespace under a root
//!   directory, committed atomically via write-to-temp-then-rename.
//!
//! Consumer code never touches files or serialization directly; everything
//! goes through the trait so alternative backends (embedded databases,
//! platform preference stores) can be injected without touching callers.

mod backend;
pub mod error;
mod file;
mod memory;

pub use backend::KvBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
