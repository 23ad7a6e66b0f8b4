//! Background driver: one hydration sequence, then the reconciliation loop.
//!
//! The driver holds only a weak reference to the map, so abandoned maps
//! wind down on their own without an explicit `close`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::time::MissedTickBehavior;

use dataio_types::{encode_field_id, ChangeNotice};

use crate::codec;

use super::{publish_notice, with_timeout, MapKey, MapValue, Shared};

pub(super) fn spawn_driver<K, V>(inner: &Arc<Shared<K, V>>)
where
    K: MapKey,
    V: MapValue,
{
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        if hydrate(&weak).await {
            reconcile(&weak).await;
        }
    });
}

/// Full read of the backing table, retried until it succeeds; opens the
/// readiness gate. Returns false if the map closed or vanished first.
async fn hydrate<K, V>(weak: &Weak<Shared<K, V>>) -> bool
where
    K: MapKey,
    V: MapValue,
{
    loop {
        let Some(inner) = weak.upgrade() else {
            return false;
        };
        if inner.is_closed() {
            return false;
        }

        match with_timeout(
            inner.options.op_timeout(),
            inner.store.hash_get_all(&inner.name),
        )
        .await
        {
            Ok(pairs) => {
                let total = pairs.len();
                install_snapshot(&inner, pairs);
                // send_replace latches the gate even while nothing subscribes
                // to it yet; a plain send discards the value in that case
                inner.ready_tx.send_replace(true);
                tracing::debug!("[SyncedMap] {:?}: hydrated {} field(s)", inner.name, total);
                return true;
            }
            Err(e) => {
                tracing::warn!(
                    "[SyncedMap] {:?}: hydration attempt failed, retrying: {}",
                    inner.name,
                    e
                );
            }
        }

        let pause = inner.options.retry_pause();
        let mut closed_rx = inner.closed_tx.subscribe();
        drop(inner);
        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            _ = closed_rx.changed() => {}
        }
    }
}

/// Decodes a raw table snapshot and installs it. Local writes still waiting
/// to be pushed win over the snapshot; `last_synced` becomes exactly what
/// the store holds. Also serves the subscriber's full re-pull.
pub(super) fn install_snapshot<K, V>(inner: &Shared<K, V>, pairs: Vec<(Vec<u8>, Vec<u8>)>)
where
    K: MapKey,
    V: MapValue,
{
    let mut snapshot: HashMap<K, V> = HashMap::with_capacity(pairs.len());
    for (field, value) in pairs {
        let key = match codec::decode::<K>(&field) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(
                    "[SyncedMap] {:?}: skipping undecodable field: {}",
                    inner.name,
                    e
                );
                continue;
            }
        };
        match codec::decode::<V>(&value) {
            Ok(value) => {
                snapshot.insert(key, value);
            }
            Err(e) => {
                tracing::warn!(
                    "[SyncedMap] {:?}: skipping undecodable value: {}",
                    inner.name,
                    e
                );
            }
        }
    }

    let mut state = inner.state.lock();
    let state = &mut *state;
    state.last_synced = snapshot.clone();
    for key in &state.dirty_set {
        match state.entries.get(key) {
            Some(value) => {
                snapshot.insert(key.clone(), value.clone());
            }
            None => {
                // pending local delete
                snapshot.remove(key);
            }
        }
    }
    state.entries = snapshot;
}

/// Pushes queued keys on a fixed cadence until the map closes.
async fn reconcile<K, V>(weak: &Weak<Shared<K, V>>)
where
    K: MapKey,
    V: MapValue,
{
    let (mut ticker, mut closed_rx) = {
        let Some(inner) = weak.upgrade() else { return };
        let mut ticker = tokio::time::interval(inner.options.sync_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        (ticker, inner.closed_tx.subscribe())
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = closed_rx.changed() => {}
        }

        let Some(inner) = weak.upgrade() else { return };
        if inner.is_closed() {
            tracing::debug!("[SyncedMap] {:?}: reconciliation loop stopped", inner.name);
            return;
        }
        flush_dirty(&inner).await;
    }
}

/// One tick: drain the keys queued at tick start and push each in turn.
async fn flush_dirty<K, V>(inner: &Arc<Shared<K, V>>)
where
    K: MapKey,
    V: MapValue,
{
    let batch: Vec<K> = {
        let mut state = inner.state.lock();
        let state = &mut *state;
        let keys: Vec<K> = state.dirty_queue.drain(..).collect();
        for key in &keys {
            state.dirty_set.remove(key);
        }
        keys
    };

    for key in batch {
        sync_key(inner, key).await;
    }
}

/// Pushes one key's current local state to the store.
async fn sync_key<K, V>(inner: &Arc<Shared<K, V>>, key: K)
where
    K: MapKey,
    V: MapValue,
{
    let (current, last) = {
        let state = inner.state.lock();
        (
            state.entries.get(&key).cloned(),
            state.last_synced.get(&key).cloned(),
        )
    };
    // only matching present values count as converged; a queued key that is
    // locally absent is a delete request even when nothing was ever synced
    if current.is_some() && current == last {
        return;
    }

    let field = match codec::encode(&key) {
        Ok(field) => field,
        Err(e) => {
            tracing::warn!(
                "[SyncedMap] {:?}: key refused to encode, kept local only: {}",
                inner.name,
                e
            );
            keep_local(inner, key);
            return;
        }
    };

    match current {
        Some(value) => push_value(inner, key, value, field).await,
        None => push_tombstone(inner, key, field).await,
    }
}

async fn push_value<K, V>(inner: &Arc<Shared<K, V>>, key: K, value: V, field: Vec<u8>)
where
    K: MapKey,
    V: MapValue,
{
    let bytes = match codec::encode(&value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                "[SyncedMap] {:?}: value refused to encode, kept local only: {}",
                inner.name,
                e
            );
            keep_local(inner, key);
            return;
        }
    };

    match with_timeout(
        inner.options.op_timeout(),
        inner.store.hash_set(&inner.name, &field, &bytes),
    )
    .await
    {
        Ok(()) => {
            publish_notice(
                inner,
                ChangeNotice::set(inner.instance_id.clone(), encode_field_id(&field)),
            )
            .await;
            let mut state = inner.state.lock();
            let state = &mut *state;
            if state.entries.get(&key) != Some(&value) {
                // the entry moved on mid-push; keep it queued
                state.enqueue(key.clone());
            }
            state.last_synced.insert(key, value);
        }
        Err(e) => {
            tracing::debug!(
                "[SyncedMap] {:?}: push failed, retrying next tick: {}",
                inner.name,
                e
            );
            requeue(inner, key);
        }
    }
}

async fn push_tombstone<K, V>(inner: &Arc<Shared<K, V>>, key: K, field: Vec<u8>)
where
    K: MapKey,
    V: MapValue,
{
    match with_timeout(
        inner.options.op_timeout(),
        inner.store.hash_del(&inner.name, &field),
    )
    .await
    {
        Ok(()) => {
            publish_notice(
                inner,
                ChangeNotice::set(inner.instance_id.clone(), encode_field_id(&field)),
            )
            .await;
            let mut state = inner.state.lock();
            let state = &mut *state;
            state.last_synced.remove(&key);
            if state.entries.contains_key(&key) {
                // re-created mid-delete; push the new value next tick
                state.enqueue(key);
            }
        }
        Err(e) => {
            tracing::debug!(
                "[SyncedMap] {:?}: remote delete failed, retrying next tick: {}",
                inner.name,
                e
            );
            requeue(inner, key);
        }
    }
}

/// Serialization failure: the key is excluded from `last_synced` and stays
/// queued, so it is retried every tick, never marked synced and never
/// crashes the loop.
fn keep_local<K, V>(inner: &Shared<K, V>, key: K)
where
    K: MapKey,
    V: MapValue,
{
    let mut state = inner.state.lock();
    let state = &mut *state;
    state.last_synced.remove(&key);
    state.enqueue(key);
}

fn requeue<K, V>(inner: &Shared<K, V>, key: K)
where
    K: MapKey,
    V: MapValue,
{
    inner.state.lock().enqueue(key);
}
