use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{DecodeError, Error, RpcError, RpcResult};

/// A JSON-RPC response, carrying a result, an error, or (rarely) neither
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn new(id: impl Into<String>, result: Option<Box<RawValue>>, error: Option<RpcError>) -> Self {
        Self {
            id: id.into(),
            result,
            error,
        }
    }

    pub fn success(id: impl Into<String>, result: Box<RawValue>) -> Self {
        Self::new(id, Some(result), None)
    }

    /// Serialize `result` and wrap it in a success response
    pub fn with_result<R>(id: impl Into<String>, result: &R) -> Result<Self, serde_json::Error>
    where
        R: Serialize + ?Sized,
    {
        Ok(Self::success(id, serde_json::value::to_raw_value(result)?))
    }

    pub fn error(id: impl Into<String>, error: RpcError) -> Self {
        Self::new(id, None, Some(error))
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Decode the result into `T`; `Ok(None)` when the response carries none
    pub fn result<T: DeserializeOwned>(&self) -> RpcResult<Option<T>> {
        decode_result(self.result.as_deref())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

pub(crate) fn decode_result<T: DeserializeOwned>(raw: Option<&RawValue>) -> RpcResult<Option<T>> {
    match raw {
        Some(raw) => serde_json::from_str(raw.get())
            .map(Some)
            .map_err(|e| Error::Decode(DecodeError::Result(e))),
        None => Ok(None),
    }
}
