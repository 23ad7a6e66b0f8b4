//! Per-process registry: one synced map (and one set of background tasks)
//! per logical name.
//!
//! Maps are cached type-erased; `load` hands back a typed clone of the
//! cached handle or a [`SyncError::TypeMismatch`] when the name was first
//! claimed with different type parameters.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{SyncError, SyncResult};
use crate::store::Store;
use crate::synced_map::{MapKey, MapValue, SyncOptions, SyncedMap};

const INFO_KEY: &str = "__info__";
const INFO_VALUE: &str = "This database is being used by the Amethyst Framework.";

/// Object-safe face of a cached map, enough to recover the typed handle
/// and to shut it down.
trait AnyMapHandle: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn close(&self);
}

impl<K, V> AnyMapHandle for SyncedMap<K, V>
where
    K: MapKey,
    V: MapValue,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn close(&self) {
        SyncedMap::close(self);
    }
}

/// Factory and cache for every synced map in the process.
pub struct MapRegistry {
    store: Arc<dyn Store>,
    options: SyncOptions,
    instances: DashMap<String, Box<dyn AnyMapHandle>>,
}

impl MapRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_options(store, SyncOptions::default())
    }

    /// Registry whose maps all share the given tunables.
    pub fn with_options(store: Arc<dyn Store>, options: SyncOptions) -> Self {
        Self {
            store,
            options,
            instances: DashMap::new(),
        }
    }

    /// Returns the map registered under `name`, constructing it on first
    /// request. Concurrent callers racing on the same name all receive the
    /// same instance.
    pub fn load<K, V>(&self, name: &str) -> SyncResult<SyncedMap<K, V>>
    where
        K: MapKey,
        V: MapValue,
    {
        if let Some(existing) = self.instances.get(name) {
            return Self::typed(name, existing.as_ref());
        }

        let entry = self.instances.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!("[MapRegistry] constructing map {:?}", name);
            Box::new(SyncedMap::<K, V>::with_options(
                name,
                Arc::clone(&self.store),
                self.options.clone(),
            ))
        });
        Self::typed(name, entry.as_ref())
    }

    fn typed<K, V>(name: &str, handle: &dyn AnyMapHandle) -> SyncResult<SyncedMap<K, V>>
    where
        K: MapKey,
        V: MapValue,
    {
        handle
            .as_any()
            .downcast_ref::<SyncedMap<K, V>>()
            .cloned()
            .ok_or_else(|| SyncError::TypeMismatch {
                name: name.to_string(),
            })
    }

    /// Writes the in-use marker the framework leaves in every database it
    /// touches.
    pub async fn mark_in_use(&self) -> SyncResult<()> {
        self.store.put_text(INFO_KEY, INFO_VALUE).await?;
        Ok(())
    }

    /// Signals every cached map's background machinery to stop. In-flight
    /// pushes run to completion; local read surfaces stay usable.
    pub fn close_all(&self) {
        for entry in &self.instances {
            entry.value().close();
        }
        tracing::debug!("[MapRegistry] closed {} map(s)", self.instances.len());
    }

    /// Number of maps constructed so far.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Drop for MapRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
