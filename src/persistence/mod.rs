//! # Persistence
//!
//! Storage boundary for the execution tree. The [`PersistenceBackend`] trait is the
//! collaborator interface; [`InMemoryBackend`] is the bundled implementation with
//! optimistic-concurrency detection. [`DbSession`] is the per-command unit of work
//! that buffers every mutation until the command context flushes it.

pub mod backend;
pub mod in_memory;
pub mod session;

pub use backend::{ChangeSet, DeletedRow, PersistenceBackend, PersistenceError, PersistenceResult};
pub use in_memory::InMemoryBackend;
pub use session::DbSession;
