//! Change-notification wire protocol.
//!
//! Every successful remote mutation of a synced map is announced on the
//! map's own pub/sub channel as a small JSON object:
//!
//! ```text
//! { "origin": "16f33ab9c2", "action": "set", "key": "CWxhbmc=" }
//! { "origin": "16f33ab9c2", "action": "clear" }
//! ```
//!
//! The protocol is advisory. There is no delivery or ordering guarantee;
//! receivers treat a notice as a hint to re-pull, never as the system of
//! record. `origin` lets an instance recognize its own echoes, and `key`
//! carries the base64 rendering of the codec-encoded hash field identifier.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;

/// What a notification announces about the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// A single field was written or deleted; `key` names it.
    Set,
    /// The whole backing table was deleted.
    Clear,
}

/// One change notification as published on a map's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    /// Instance id of the mutating map, for echo suppression
    pub origin: String,

    /// Kind of mutation
    pub action: ChangeAction,

    /// Base64 field identifier, present for `Set` only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ChangeNotice {
    /// Notice for a single-field write or delete.
    pub fn set(origin: impl Into<String>, field_id: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            action: ChangeAction::Set,
            key: Some(field_id.into()),
        }
    }

    /// Notice for a whole-table clear.
    pub fn clear(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            action: ChangeAction::Clear,
            key: None,
        }
    }

    /// Serializes the notice into its published payload.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a received payload.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Builds the notification channel id for one map:
/// `{namespace}.{database_index}.data.{map_key}`.
pub fn channel_id(namespace: &str, database_index: i64, map_key: &str) -> String {
    format!("{}.{}.data.{}", namespace, database_index, map_key)
}

/// Printable rendering of an encoded hash field identifier.
pub fn encode_field_id(field: &[u8]) -> String {
    STANDARD.encode(field)
}

/// Inverse of [`encode_field_id`].
pub fn decode_field_id(field_id: &str) -> Result<Vec<u8>, ProtocolError> {
    Ok(STANDARD.decode(field_id)?)
}
