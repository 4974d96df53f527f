//! Offline-tolerant check-in synchronization
//!
//! Door devices work against local state and submit their actions through
//! [`SyncIngress`]; the [`SyncProcessor`] drains the durable queue in
//! per-device order and applies each action against the capacity engine;
//! whatever cannot be applied parks in `conflict` for the
//! [`CheckInConflictResolver`].

pub mod ingress;
pub mod processor;
pub mod resolver;
pub mod store;

pub use ingress::SyncIngress;
pub use processor::{backoff_delay, DrainStats, EntryOutcome, ProcessorHandle, SyncProcessor};
pub use resolver::{CheckInConflictResolver, ConflictClass};
pub use store::{MemorySyncQueueStore, PgSyncQueueStore, SyncQueueStore};
