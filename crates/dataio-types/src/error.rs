//! Protocol error definitions.

use thiserror::Error;

/// Errors raised while encoding or decoding wire artifacts.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Notification payload was not the expected JSON shape.
    #[error("malformed notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Field identifier inside a notification was not valid base64.
    #[error("malformed field identifier: {0}")]
    FieldId(#[from] base64::DecodeError),
}
