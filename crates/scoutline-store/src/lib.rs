//! Persistence for Scoutline agents and runs.
//!
//! The orchestrator only depends on the [`AgentStore`] contract; the two
//! bundled backends cover tests ([`MemoryStore`]) and single-node
//! deployments ([`FileStore`]).

/// JSON-file backend.
pub mod file;
/// In-memory backend.
pub mod memory;
/// The persistence contract and its query types.
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{AgentFilter, AgentStore, RunQuery};
