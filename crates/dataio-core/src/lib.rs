//! # DataIO Core
//!
//! Redis-synchronized maps: in-memory associative containers transparently
//! mirrored into one hash table each of a shared key-value store, kept
//! eventually consistent across processes.
//!
//! ```text
//! ┌─────────────────┐  load("settings")  ┌──────────────────────────┐
//! │   MapRegistry   │ ─────────────────► │ SyncedMap<K, V>          │
//! └────────┬────────┘                    │ ├─ entries (local reads) │
//!          │ shared                      │ ├─ driver task           │
//!          ▼                             │ │    hydrate + reconcile │
//! ┌─────────────────┐   hash + pub/sub   │ └─ subscriber task       │
//! │ Arc<dyn Store>  │ ◄───────────────── └──────────────────────────┘
//! └─────────────────┘
//! ```
//!
//! Reads are served locally. Writes are local-first and pushed to the store
//! by a background reconciliation loop on a short fixed cadence; peers
//! sharing a table learn about changes over pub/sub and re-pull the affected
//! field. Consistency is last-writer-wins at hash-field granularity.

pub mod codec;
pub mod error;
pub mod registry;
pub mod store;
pub mod synced_map;

pub use error::{SyncError, SyncResult};
pub use registry::MapRegistry;
pub use store::{MemoryStore, RedisStore, Store, StoreError, StoreResult, Subscription};
pub use synced_map::{MapKey, MapValue, SyncOptions, SyncedMap};
