//! The synchronized map: an in-memory associative container mirrored into
//! one hash table of the remote store.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ SyncedMap<K, V>                                            │
//! │ ├─ entries: HashMap<K, V>        local read/write surface  │
//! │ ├─ last_synced: HashMap<K, V>    what the store holds      │
//! │ ├─ dirty queue                   keys awaiting a push      │
//! │ ├─ driver task                   hydrate, then reconcile   │
//! │ └─ subscriber task               foreign-change re-pulls   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes land locally and synchronously; the driver pushes them to the
//! store on a short fixed cadence and retries failures on later ticks.
//! Reads never leave the process. A readiness gate blocks every operation
//! except `set` and construction until the initial hydration completes, so
//! nothing ever observes a partially loaded map.

mod subscriber;
mod worker;


use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use dataio_types::{channel_id, ChangeNotice};

use crate::error::SyncResult;
use crate::store::{Store, StoreError, StoreResult};

/// Capability bound for map keys: serializable both ways, hashable and
/// cheap to clone.
pub trait MapKey: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> MapKey for T where
    T: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static
{
}

/// Capability bound for map values: serializable both ways, comparable for
/// dirty detection and cheap to clone.
pub trait MapValue: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync + 'static {}

impl<T> MapValue for T where
    T: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync + 'static
{
}

/// Tunables for a map's background machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Channel namespace prefix (default: "amethyst")
    pub namespace: String,

    /// Reconciliation cadence in milliseconds (default: 10)
    pub sync_interval_ms: u64,

    /// Upper bound for a single store round-trip in milliseconds
    /// (default: 5000)
    pub op_timeout_ms: u64,

    /// Pause between hydration attempts and subscriber reconnects in
    /// milliseconds (default: 1000)
    pub hydrate_retry_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            namespace: "amethyst".to_string(),
            sync_interval_ms: 10,
            op_timeout_ms: 5_000,
            hydrate_retry_ms: 1_000,
        }
    }
}

impl SyncOptions {
    fn sync_interval(&self) -> Duration {
        // interval() panics on zero
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms.max(1))
    }

    fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.hydrate_retry_ms.max(1))
    }
}

/// Mutable map state behind one lock. Never held across an await.
struct MapState<K, V> {
    entries: HashMap<K, V>,
    last_synced: HashMap<K, V>,
    dirty_queue: VecDeque<K>,
    dirty_set: HashSet<K>,
}

impl<K, V> MapState<K, V>
where
    K: MapKey,
{
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_synced: HashMap::new(),
            dirty_queue: VecDeque::new(),
            dirty_set: HashSet::new(),
        }
    }

    /// Queues a key for the next reconciliation tick, at most once.
    fn enqueue(&mut self, key: K) {
        if self.dirty_set.insert(key.clone()) {
            self.dirty_queue.push_back(key);
        }
    }
}

/// State shared between the public handle and the background tasks.
struct Shared<K, V> {
    name: String,
    channel: String,
    instance_id: String,
    options: SyncOptions,
    store: Arc<dyn Store>,
    state: Mutex<MapState<K, V>>,
    ready_tx: watch::Sender<bool>,
    closed_tx: watch::Sender<bool>,
}

impl<K, V> Shared<K, V> {
    fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }
}

/// One synchronized map: a cheap-to-clone handle over shared state.
///
/// Every clone (including the registry's cached copy) addresses the same
/// entries and the same background tasks.
pub struct SyncedMap<K, V> {
    inner: Arc<Shared<K, V>>,
}

impl<K, V> Clone for SyncedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for SyncedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedMap")
            .field("name", &self.inner.name)
            .field("instance_id", &self.inner.instance_id)
            .field("ready", &self.inner.is_ready())
            .finish_non_exhaustive()
    }
}

impl<K, V> SyncedMap<K, V>
where
    K: MapKey,
    V: MapValue,
{
    /// Creates a map over the hash table `name` and starts its background
    /// machinery. Never fails, even with the store unreachable; that
    /// failure mode is a readiness gate that stays closed while hydration
    /// retries.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self::with_options(name, store, SyncOptions::default())
    }

    /// Same as [`SyncedMap::new`] with explicit tunables.
    pub fn with_options(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        options: SyncOptions,
    ) -> Self {
        let name = name.into();
        let channel = channel_id(&options.namespace, store.database_index(), &name);
        let (ready_tx, _) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);

        let inner = Arc::new(Shared {
            name,
            channel,
            instance_id: generate_instance_id(),
            options,
            store,
            state: Mutex::new(MapState::new()),
            ready_tx,
            closed_tx,
        });

        worker::spawn_driver(&inner);
        subscriber::spawn(&inner);

        Self { inner }
    }

    /// Current value for `key`, or `None` if absent. Served locally; waits
    /// for hydration first.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.wait_ready().await;
        self.inner.state.lock().entries.get(key).cloned()
    }

    /// Writes `key = value`, observable locally as soon as this returns.
    ///
    /// Does not wait for hydration and never touches the store itself; the
    /// reconciliation loop pushes the value on its next tick and retries
    /// until the push lands.
    pub fn set(&self, key: K, value: V) {
        let mut state = self.inner.state.lock();
        state.entries.insert(key.clone(), value);
        state.enqueue(key);
    }

    /// Removes `key` locally and queues the remote delete, a tombstone the
    /// reconciliation loop retries until it lands. The delete is queued even
    /// for keys never seen locally, since the store may hold a field this
    /// instance missed. Returns the removed value.
    pub async fn remove(&self, key: &K) -> Option<V> {
        self.wait_ready().await;
        let mut state = self.inner.state.lock();
        let previous = state.entries.remove(key);
        state.enqueue(key.clone());
        previous
    }

    /// Empties the map and deletes the whole backing table.
    ///
    /// The remote delete runs synchronously with the caller; its failure is
    /// the one store error this type surfaces. Idempotent.
    pub async fn clear(&self) -> SyncResult<()> {
        self.wait_ready().await;
        with_timeout(
            self.inner.options.op_timeout(),
            self.inner.store.delete_table(&self.inner.name),
        )
        .await?;

        publish_notice(&self.inner, ChangeNotice::clear(self.inner.instance_id.clone())).await;

        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.last_synced.clear();
        state.dirty_queue.clear();
        state.dirty_set.clear();
        Ok(())
    }

    /// Whether `key` is currently present.
    pub async fn contains_key(&self, key: &K) -> bool {
        self.wait_ready().await;
        self.inner.state.lock().entries.contains_key(key)
    }

    /// Number of entries.
    pub async fn len(&self) -> usize {
        self.wait_ready().await;
        self.inner.state.lock().entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Point-in-time copy of the whole map.
    pub async fn snapshot(&self) -> HashMap<K, V> {
        self.wait_ready().await;
        self.inner.state.lock().entries.clone()
    }

    /// Blocks until the initial hydration has completed.
    pub async fn wait_ready(&self) {
        let mut ready_rx = self.inner.ready_tx.subscribe();
        // The sender lives in the shared state this handle holds, so the
        // wait cannot fail before the gate opens.
        let _ = ready_rx.wait_for(|ready| *ready).await;
    }

    /// Non-blocking readiness check.
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Requests termination of the background machinery. Idempotent;
    /// in-flight store operations run to completion first.
    pub fn close(&self) {
        // latches even before the background tasks subscribe to the flag
        self.inner.closed_tx.send_replace(true);
    }

    /// Whether `close` has been requested.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Logical name of the backing hash table.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Notification channel id: `{namespace}.{database_index}.data.{name}`.
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Process-local id tagged onto this instance's notifications.
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }
}

/// Bounds a store round-trip with the configured deadline.
async fn with_timeout<T>(
    deadline: Duration,
    op: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

/// Best-effort broadcast of a change notice on the map's channel.
async fn publish_notice<K, V>(inner: &Shared<K, V>, notice: ChangeNotice) {
    let payload = match notice.encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                "[SyncedMap] {:?}: change notice refused to encode: {}",
                inner.name,
                e
            );
            return;
        }
    };
    if let Err(e) = with_timeout(
        inner.options.op_timeout(),
        inner.store.publish(&inner.channel, payload),
    )
    .await
    {
        tracing::debug!("[SyncedMap] {:?}: change notice dropped: {}", inner.name, e);
    }
}

/// Time-derived hex id in the historical format of the wire protocol.
/// Distinct within a process; fleet-wide uniqueness is neither guaranteed
/// nor required, ids only suppress self-echoes.
fn generate_instance_id() -> String {
    static SERIAL: AtomicU64 = AtomicU64::new(0);
    let ticks = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        / 100;
    let serial = u128::from(SERIAL.fetch_add(1, Ordering::Relaxed));
    format!("{:x}", ticks.wrapping_add(serial))
}
