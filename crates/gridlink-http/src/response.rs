//! Decoded REST responses.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Reason phrase reported with every success; the transport exposes none.
pub const PLACEHOLDER_REASON: &str = "n/a";

/// A successful, fully decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    /// Always valid JSON.
    pub payload: Value,
    pub status: u16,
    pub reason: String,
}

impl RestResponse {
    /// Decode a raw success body. Invalid JSON is an error, never passed through.
    pub fn decode(status: u16, body: &[u8]) -> Result<Self, serde_json::Error> {
        let payload = serde_json::from_slice(body)?;
        Ok(Self {
            payload,
            status,
            reason: PLACEHOLDER_REASON.to_string(),
        })
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// The `result` array most endpoints wrap their rows in.
    pub fn result_rows(&self) -> Option<&Vec<Value>> {
        self.payload.get("result").and_then(Value::as_array)
    }
}
