//! Endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and diagnostics applied to a single endpoint.
///
/// Every field is optional when deserializing; missing fields take their
/// default. Durations are expressed in milliseconds.
///
/// ```rust
/// use duplex_json_rpc::EndpointConfig;
/// use std::time::Duration;
///
/// let config: EndpointConfig =
///     serde_json::from_str(r#"{"request_timeout": 1500, "max_pending_requests": 64}"#).unwrap();
/// assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
/// assert_eq!(config.max_message_size, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// How long a sent request waits for its response before its callback
    /// is evicted. `None` keeps entries until the endpoint closes.
    #[serde(with = "option_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// Maximum number of requests awaiting a response at once
    pub max_pending_requests: Option<usize>,

    /// Inbound messages larger than this many bytes are rejected before decoding
    pub max_message_size: Option<usize>,

    /// Log every raw inbound and outbound message at trace level
    pub log_messages: bool,
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_max_pending_requests(mut self, limit: usize) -> Self {
        self.max_pending_requests = Some(limit);
        self
    }

    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = Some(limit);
        self
    }

    pub fn with_log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
