//! Inbound message classification
//!
//! Every payload read from a connection is decoded into a loose envelope and
//! then sorted into exactly one of the three message kinds:
//!
//! | `id`    | `method` | kind         |
//! |---------|----------|--------------|
//! | present | present  | Request      |
//! | present | absent   | Response     |
//! | absent  | present  | Notification |
//! | absent  | absent   | malformed    |
//!
//! Empty strings count as absent. Params, results and error data are never
//! decoded here; they are carried as raw JSON until a handler asks for them.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{DecodeError, Error, RpcError, RpcResult};
use crate::notification::Notification;
use crate::request::Request;
use crate::response::Response;

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Box<RawValue>>,
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// The three JSON-RPC message kinds
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// Message kind, used in logs and introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Notification,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
            MessageKind::Notification => write!(f, "notification"),
        }
    }
}

impl Message {
    /// Classify a raw payload as a request, response or notification
    pub fn classify(bytes: &[u8]) -> RpcResult<Self> {
        // a struct would happily deserialize from a positional array
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
        if first == Some(&b'[') {
            return Err(Error::malformed("batch messages are not supported"));
        }

        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(DecodeError::Message(e)))?;

        let id = envelope.id.filter(|id| !id.is_empty());
        let method = envelope.method.filter(|method| !method.is_empty());

        match (id, method) {
            (Some(id), Some(method)) => Ok(Message::Request(Request {
                id,
                method,
                params: envelope.params,
            })),
            (Some(id), None) => Ok(Message::Response(Response {
                id,
                result: envelope.result,
                error: envelope.error,
            })),
            (None, Some(method)) => Ok(Message::Notification(Notification {
                method,
                params: envelope.params,
            })),
            (None, None) => Err(Error::malformed("message has neither an id nor a method")),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
            Message::Notification(_) => MessageKind::Notification,
        }
    }

    /// Request or response id; notifications have none
    pub fn id(&self) -> Option<&str> {
        match self {
            Message::Request(request) => Some(&request.id),
            Message::Response(response) => Some(&response.id),
            Message::Notification(_) => None,
        }
    }

    /// Called method; responses have none
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(request) => Some(&request.method),
            Message::Notification(notification) => Some(&notification.method),
            Message::Response(_) => None,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

/// Shorthand for [`Message::classify`]
pub fn classify(bytes: &[u8]) -> RpcResult<Message> {
    Message::classify(bytes)
}

/// Encode an outbound params value. `null` means "no params" and is omitted
/// from the wire.
pub(crate) fn to_raw_payload<T>(value: &T) -> Result<Option<Box<RawValue>>, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::value::to_raw_value(value)?;
    if raw.get() == "null" {
        Ok(None)
    } else {
        Ok(Some(raw))
    }
}
