//! Payload codecs used by the transport.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SharedSource;

/// Serialises request payloads and parses response bodies.
pub trait Codec: Send + Sync {
    /// Value sent in the `Content-Type` header.
    fn content_type(&self) -> &'static str;

    /// Encode a payload.
    ///
    /// # Errors
    ///
    /// Returns the codec's own error when the value cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SharedSource>;

    /// Decode a response body.
    ///
    /// # Errors
    ///
    /// Returns the codec's own error when the body does not match `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SharedSource>;
}

/// JSON codec; request bodies are pretty-printed to keep server logs readable.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Codec emitting compact JSON.
    #[must_use]
    pub const fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SharedSource> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|err| Arc::new(err) as SharedSource)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SharedSource> {
        serde_json::from_slice(bytes).map_err(|err| Arc::new(err) as SharedSource)
    }
}
