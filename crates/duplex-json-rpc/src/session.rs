//! Per-connection session store
//!
//! A [`Session`] is a thread-safe key/value map scoped to one connection. Any
//! handler working on a message from that connection can reach it through its
//! context, which makes it the natural place for middleware to leave state
//! for later links (an authenticated user id, negotiated capabilities, ...).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Thread-safe data store for arbitrary values scoped to one connection.
///
/// Cloning a `Session` yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct Session {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    /// Read a value and decode it into `T`
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key).map(serde_json::from_value).transpose()
    }

    /// Store a value, returning the previous one
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.write().insert(key.into(), value)
    }

    pub fn set_typed<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(key, value))
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_session_state() {
        let session = Session::new();
        assert!(session.is_empty());
        assert_eq!(session.get("key1"), None);

        assert_eq!(session.set("key1", json!("value1")), None);
        assert_eq!(session.get("key1"), Some(json!("value1")));

        assert_eq!(session.set("key1", json!(2)), Some(json!("value1")));
        assert_eq!(session.len(), 1);

        assert_eq!(session.remove("key1"), Some(json!(2)));
        assert!(!session.contains_key("key1"));
    }

    #[test]
    fn test_typed_values() {
        let session = Session::new();
        let user = User {
            id: 7,
            name: "ada".to_string(),
        };
        session.set_typed("user", &user).unwrap();

        let loaded: Option<User> = session.get_typed("user").unwrap();
        assert_eq!(loaded, Some(user));

        let missing: Option<User> = session.get_typed("other").unwrap();
        assert!(missing.is_none());

        session.set("broken", json!("not a user"));
        assert!(session.get_typed::<User>("broken").is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::new();
        let handle = session.clone();
        handle.set("shared", json!(true));
        assert_eq!(session.get("shared"), Some(json!(true)));
        assert_eq!(session.keys(), vec!["shared".to_string()]);
    }

    #[test]
    fn test_concurrent_writers() {
        let session = Session::new();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let session = session.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        session.set(format!("{}-{}", t, i), json!(i));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(session.len(), 800);
    }
}
