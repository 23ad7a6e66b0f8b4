//! Binary object codec for hash fields and stored values.
//!
//! Both the hash field identifier and the stored value travel through this
//! codec on the way to the store; reads apply the exact inverse. Encoding a
//! given value is deterministic, which is what makes the output usable as a
//! field identifier.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by [`encode`] / [`decode`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("value refused to encode: {0}")]
    Encode(#[source] bincode::Error),

    #[error("stored bytes refused to decode: {0}")]
    Decode(#[source] bincode::Error),
}

/// Encodes a value into the opaque byte form used for fields and values.
pub fn encode<T>(value: &T) -> Result<Vec<u8>, CodecError>
where
    T: Serialize + ?Sized,
{
    bincode::serialize(value).map_err(CodecError::Encode)
}

/// Exact inverse of [`encode`].
pub fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: DeserializeOwned,
{
    bincode::deserialize(bytes).map_err(CodecError::Decode)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        lang: String,
        volume: u8,
    }

    #[test]
    fn test_roundtrip_string() {
        let bytes = encode("lang").unwrap();
        let back: String = decode(&bytes).unwrap();
        assert_eq!(back, "lang");
    }

    #[test]
    fn test_roundtrip_struct() {
        let prefs = Prefs {
            lang: "en".to_string(),
            volume: 7,
        };
        let bytes = encode(&prefs).unwrap();
        assert_eq!(decode::<Prefs>(&bytes).unwrap(), prefs);
    }

    #[test]
    fn test_deterministic_for_field_identifiers() {
        assert_eq!(encode("blacklist").unwrap(), encode("blacklist").unwrap());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        // length prefix claims far more bytes than are present
        let result = decode::<String>(&[255, 255, 255, 255, 255, 255, 255, 255, 1]);
        assert!(result.is_err());
    }
}
