use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use thiserror::Error;

use crate::connection::ConnectionError;

/// Result type for protocol operations
pub type RpcResult<T> = Result<T, Error>;

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i64), // -32099 to -32000
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ServerError(_) => "Server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Error object carried by an error response.
///
/// Fields are private: once built, an `RpcError` is never mutated. The
/// optional `data` member stays undecoded until [`RpcError::data`] is called
/// with the type the caller expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    code: i64,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Box<RawValue>>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Build an error with a structured `data` member
    pub fn with_data<T>(code: i64, message: impl Into<String>, data: &T) -> RpcResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::value::to_raw_value(data)
            .map_err(|e| Error::Send(SendError::Serialize(e)))?;
        Ok(Self {
            code,
            message: message.into(),
            data: Some(data),
        })
    }

    /// Build an error from an already-encoded `data` member
    pub fn with_raw_data(
        code: i64,
        message: impl Into<String>,
        data: Option<Box<RawValue>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn from_code(code: ErrorCode, message: Option<String>) -> Self {
        Self::new(
            code.code(),
            message.unwrap_or_else(|| code.message().to_string()),
        )
    }

    pub fn parse_error() -> Self {
        Self::from_code(ErrorCode::ParseError, None)
    }

    pub fn invalid_request(message: Option<String>) -> Self {
        Self::from_code(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::from_code(
            ErrorCode::MethodNotFound,
            Some(format!("Method '{}' not found", method)),
        )
    }

    pub fn invalid_params(message: &str) -> Self {
        Self::from_code(ErrorCode::InvalidParams, Some(message.to_string()))
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::from_code(ErrorCode::InternalError, message)
    }

    pub fn server_error(code: i64, message: &str) -> Self {
        Self::from_code(ErrorCode::ServerError(code), Some(message.to_string()))
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Undecoded `data` member, if present
    pub fn raw_data(&self) -> Option<&RawValue> {
        self.data.as_deref()
    }

    /// Decode the `data` member into `T`. Absent data yields `Ok(None)`.
    pub fn data<T: DeserializeOwned>(&self) -> RpcResult<Option<T>> {
        match &self.data {
            Some(raw) => serde_json::from_str(raw.get())
                .map(Some)
                .map_err(|e| Error::Decode(DecodeError::ErrorData(e))),
            None => Ok(None),
        }
    }
}

impl PartialEq for RpcError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && self.data.as_ref().map(|d| d.get()) == other.data.as_ref().map(|d| d.get())
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Failures while decoding an inbound message or one of its lazy payloads
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot deserialize message: {0}")]
    Message(#[source] serde_json::Error),

    #[error("cannot deserialize request params: {0}")]
    Params(#[source] serde_json::Error),

    #[error("cannot deserialize response result: {0}")]
    Result(#[source] serde_json::Error),

    #[error("cannot deserialize error data: {0}")]
    ErrorData(#[source] serde_json::Error),
}

/// Failures while putting an outbound message on the connection
#[derive(Debug, Error)]
pub enum SendError {
    #[error("cannot serialize message: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("cannot write message: {0}")]
    Write(#[source] ConnectionError),
}

/// Errors produced by the protocol engine
#[derive(Debug, Error)]
pub enum Error {
    /// Inbound payload is valid JSON but neither a request, response nor notification
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("too many pending requests (limit {0})")]
    TooManyPending(usize),

    #[error("request id {0} is already awaiting a response")]
    DuplicateRequestId(String),

    #[error("request {0} timed out waiting for a response")]
    Timeout(String),

    #[error("request {0} was abandoned before a response arrived")]
    Abandoned(String),

    #[error("no connection with id {0}")]
    UnknownConnection(String),

    /// Error response returned by the remote peer
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Application failure raised inside a handler
    #[error("handler error: {0}")]
    Handler(String),
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    pub fn is_send_error(&self) -> bool {
        matches!(self, Self::Send(_))
    }

    /// Remote error object, if this error came back from the peer
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(error) => Some(error),
            _ => None,
        }
    }
}
