use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{DecodeError, Error, RpcResult};
use crate::message::to_raw_payload;

/// A JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Create a new request with no parameters
    pub fn new_no_params(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(id, method, None)
    }

    /// Create a request from any serializable params value.
    /// A value that serializes to `null` (such as `()`) is sent without params.
    pub fn with_params<P>(
        id: impl Into<String>,
        method: impl Into<String>,
        params: &P,
    ) -> Result<Self, serde_json::Error>
    where
        P: Serialize + ?Sized,
    {
        Ok(Self::new(id, method, to_raw_payload(params)?))
    }

    /// Decode the params into `T`; `Ok(None)` when the request carries none
    pub fn params<T: DeserializeOwned>(&self) -> RpcResult<Option<T>> {
        decode_params(self.params.as_deref())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

pub(crate) fn decode_params<T: DeserializeOwned>(raw: Option<&RawValue>) -> RpcResult<Option<T>> {
    match raw {
        Some(raw) => serde_json::from_str(raw.get())
            .map(Some)
            .map_err(|e| Error::Decode(DecodeError::Params(e))),
        None => Ok(None),
    }
}
