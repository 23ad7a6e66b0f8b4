//! Change-notification subscriber: applies foreign mutations by re-pulling
//! the affected field, or the whole table on a clear.
//!
//! Notices are advisory. Anything malformed, self-originated or unfetchable
//! is logged and dropped; the map never diverges harder than "stale until
//! the next notice or local write".

use std::sync::{Arc, Weak};

use dataio_types::{decode_field_id, ChangeAction, ChangeNotice};

use crate::codec;

use super::{with_timeout, worker, MapKey, MapValue, Shared};

pub(super) fn spawn<K, V>(inner: &Arc<Shared<K, V>>)
where
    K: MapKey,
    V: MapValue,
{
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        run(&weak).await;
    });
}

/// Subscribes to the map's channel and pumps notices until the map closes.
/// Resubscribes with a pause when the feed ends or cannot be opened.
async fn run<K, V>(weak: &Weak<Shared<K, V>>)
where
    K: MapKey,
    V: MapValue,
{
    loop {
        let Some(inner) = weak.upgrade() else { return };
        if inner.is_closed() {
            return;
        }
        let mut closed_rx = inner.closed_tx.subscribe();
        let pause = inner.options.retry_pause();

        match with_timeout(
            inner.options.op_timeout(),
            inner.store.subscribe(&inner.channel),
        )
        .await
        {
            Ok(mut feed) => {
                tracing::debug!("[SyncedMap] {:?}: listening on {}", inner.name, inner.channel);
                drop(inner);
                loop {
                    tokio::select! {
                        payload = feed.recv() => {
                            let Some(payload) = payload else {
                                break; // feed ended, resubscribe
                            };
                            let Some(inner) = weak.upgrade() else { return };
                            if inner.is_closed() {
                                return;
                            }
                            handle_notice(&inner, &payload).await;
                        }
                        _ = closed_rx.changed() => {
                            let Some(inner) = weak.upgrade() else { return };
                            if inner.is_closed() {
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    "[SyncedMap] {:?}: subscribe failed, retrying: {}",
                    inner.name,
                    e
                );
                drop(inner);
            }
        }

        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            _ = closed_rx.changed() => {}
        }
    }
}

async fn handle_notice<K, V>(inner: &Arc<Shared<K, V>>, payload: &[u8])
where
    K: MapKey,
    V: MapValue,
{
    if !inner.is_ready() {
        return; // hydration will install the full table anyway
    }

    let notice = match ChangeNotice::decode(payload) {
        Ok(notice) => notice,
        Err(e) => {
            tracing::debug!(
                "[SyncedMap] {:?}: ignoring malformed notice: {}",
                inner.name,
                e
            );
            return;
        }
    };
    if notice.origin == inner.instance_id {
        return; // our own echo
    }

    match notice.action {
        ChangeAction::Set => {
            let Some(field_id) = notice.key.as_deref() else {
                tracing::debug!("[SyncedMap] {:?}: set notice without a field id", inner.name);
                return;
            };
            let field = match decode_field_id(field_id) {
                Ok(field) => field,
                Err(e) => {
                    tracing::debug!(
                        "[SyncedMap] {:?}: undecodable field id in notice: {}",
                        inner.name,
                        e
                    );
                    return;
                }
            };
            let key = match codec::decode::<K>(&field) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(
                        "[SyncedMap] {:?}: foreign field does not decode as a key: {}",
                        inner.name,
                        e
                    );
                    return;
                }
            };
            refresh_field(inner, key, &field).await;
        }
        ChangeAction::Clear => {
            refresh_table(inner).await;
        }
    }
}

/// Re-pulls one field and installs the result, unless a local write for the
/// same key is still waiting to be pushed (local wins until then). A field
/// missing remotely removes the local entry.
async fn refresh_field<K, V>(inner: &Arc<Shared<K, V>>, key: K, field: &[u8])
where
    K: MapKey,
    V: MapValue,
{
    match with_timeout(
        inner.options.op_timeout(),
        inner.store.hash_get(&inner.name, field),
    )
    .await
    {
        Ok(Some(bytes)) => {
            let value = match codec::decode::<V>(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        "[SyncedMap] {:?}: foreign value refused to decode: {}",
                        inner.name,
                        e
                    );
                    return;
                }
            };
            let mut state = inner.state.lock();
            let state = &mut *state;
            if !state.dirty_set.contains(&key) {
                state.entries.insert(key.clone(), value.clone());
                state.last_synced.insert(key, value);
            }
        }
        Ok(None) => {
            let mut state = inner.state.lock();
            let state = &mut *state;
            if !state.dirty_set.contains(&key) {
                state.entries.remove(&key);
                state.last_synced.remove(&key);
            }
        }
        Err(e) => {
            tracing::debug!("[SyncedMap] {:?}: field re-pull failed: {}", inner.name, e);
        }
    }
}

/// Full re-pull after a foreign clear.
async fn refresh_table<K, V>(inner: &Arc<Shared<K, V>>)
where
    K: MapKey,
    V: MapValue,
{
    match with_timeout(
        inner.options.op_timeout(),
        inner.store.hash_get_all(&inner.name),
    )
    .await
    {
        Ok(pairs) => {
            worker::install_snapshot(inner, pairs);
        }
        Err(e) => {
            tracing::debug!("[SyncedMap] {:?}: table re-pull failed: {}", inner.name, e);
        }
    }
}
